use pocketjs::diagnostics::ErrorKind;
use pocketjs::runtime::{Args, Runtime, RuntimeConfig};
use pocketjs::value::{Kind, Value};

mod common;
use crate::common::{run, run_with};

#[macro_export]
macro_rules! assert_runtime {
    ($src:expr, value: $expected:expr) => {{
        let out = run($src);
        assert!(out.error.is_none(), "Expected no error, got: {:?}", out.error);
        assert_eq!(out.value, $expected);
    }};
    ($src:expr, output: $expected:expr) => {{
        let out = run($src);
        assert!(out.error.is_none(), "Expected no error, got: {:?}", out.error);
        assert_eq!(out.output, $expected);
    }};
    ($src:expr, error: $kind:expr, $msg:expr) => {{
        let out = run($src);
        let (kind, msg) = out.error.expect("Expected an error");
        assert_eq!(kind, $kind, "message was: {msg}");
        assert!(msg.contains($msg), "Expected error containing {:?}, got: {:?}", $msg, msg);
    }};
}

#[test]
fn arithmetic_precedence() {
    assert_runtime!("let a = 1 + 2 * 3; a;", value: "7");
}

#[test]
fn string_concatenation() {
    assert_runtime!(r#"let s = "a" + "b"; s;"#, value: r#""ab""#);
}

#[test]
fn function_call() {
    assert_runtime!("function f(a,b) { return a + b; } f(2,3);", value: "5");
}

#[test]
fn object_members() {
    assert_runtime!("let o = {x:1,y:2}; o.x + o.y;", value: "3");
}

#[test]
fn for_loop_sum() {
    assert_runtime!(
        "let sum = 0; for (let i = 0; i < 5; i++) { sum = sum + i; } sum;",
        value: "10"
    );
}

#[test]
fn undeclared_identifier() {
    assert_runtime!("x;", error: ErrorKind::Reference, "not found");
    assert_eq!(run("x;").value, "ERROR: 'x' not found");
}

#[test]
fn literal_forms() {
    assert_runtime!("1.5", value: "1.5");
    assert_runtime!("0x10", value: "16");
    assert_runtime!("true", value: "true");
    assert_runtime!("false", value: "false");
    assert_runtime!("null", value: "null");
    assert_runtime!("undefined", value: "undefined");
    assert_runtime!(r"'x\x41\'y'", value: r#""xA'y""#);
    assert_runtime!(r#""tab\there""#, value: "\"tab\there\"");
    assert_runtime!("let o = {a: 'x', 'b c': 2}; o", value: r#"{"b c":2,"a":"x"}"#);
    assert_runtime!("let o = {}; o", value: "{}");
    assert_runtime!(
        "let f = function(a) { return a; }; f",
        value: "function(a) { return a; }"
    );
    assert_runtime!("print", value: r#""native_fn_0""#);
}

#[test]
fn bad_string_escape() {
    assert_runtime!(r"'a\qb'", error: ErrorKind::Syntax, "bad str literal");
    assert_runtime!(r"'\x+1'", error: ErrorKind::Syntax, "bad str literal");
}

#[test]
fn self_referencing_object_prints_once() {
    assert_runtime!(
        "let o = {a: 1, b: 1}; o.a = o; o.b = o; o",
        value: r#"{"b":{...},"a":{...}}"#
    );
    assert_runtime!(
        "let a = {n: 1}; let b = {a: a}; a.b = b; a",
        value: r#"{"b":{"a":{...}},"n":1}"#
    );
}

#[test]
fn shared_children_print_in_bounded_output() {
    let src = "let a = {}; for (let i = 0; i < 40; i++) { a = {x: a, y: a}; } a";
    let out = run_with(src, 64 * 1024, RuntimeConfig::default());
    assert_eq!(out.error, None);
    assert!(out.value.contains("{...}"));
    assert!(out.value.len() < 128 * 1024);
}

#[test]
fn number_formatting() {
    assert_runtime!("1 / 3", value: "0.333333");
    assert_runtime!("0.1 + 0.2", value: "0.3");
    assert_runtime!("2 * 3.5", value: "7");
    assert_runtime!("-5", value: "-5");
    assert_runtime!("1e21", value: "1e+21");
    assert_runtime!("1e308 * 10", value: "inf");
}

#[test]
fn nan_stays_a_number() {
    assert_runtime!("let inf = 1e308 * 10; let nan = inf - inf; nan", value: "nan");
    assert_runtime!("let inf = 1e308 * 10; typeof (inf - inf)", value: r#""number""#);
    assert_runtime!("let inf = 1e308 * 10; let nan = inf * 0; nan === nan", value: "false");
}

#[test]
fn arithmetic_operators() {
    assert_runtime!("7 % 3", value: "1");
    assert_runtime!("1 << 4", value: "16");
    assert_runtime!("-16 >> 2", value: "-4");
    assert_runtime!("-1 >>> 60", value: "15");
    assert_runtime!("~5", value: "-6");
    assert_runtime!("6 & 3 | 8 ^ 1", value: "11");
    assert_runtime!("+'a'.length", value: "1");
}

#[test]
fn division_by_zero() {
    assert_runtime!("1 / 0", error: ErrorKind::Semantic, "div by zero");
}

#[test]
fn compound_assignment() {
    assert_runtime!("let x = 10; x -= 3; x *= 2; x", value: "14");
    assert_runtime!("let b = 6; b &= 3; b |= 8; b ^= 1; b", value: "11");
    assert_runtime!("let s = 'a'; s += 'b'; s", value: r#""ab""#);
    assert_runtime!("let a = 1, b = 2; a = b = 5; a + b", value: "10");
}

#[test]
fn postfix_operators() {
    assert_runtime!("let i = 3; let j = i--; j * 10 + i", value: "32");
    assert_runtime!("let i = 3; i++; i++; i", value: "5");
}

#[test]
fn comparison_and_equality() {
    assert_runtime!("1 < 2", value: "true");
    assert_runtime!("2 <= 1", value: "false");
    assert_runtime!("1 == 1", value: "true");
    assert_runtime!("1 !== 2", value: "true");
    assert_runtime!("null === null", value: "true");
    assert_runtime!("null === undefined", value: "false");
    assert_runtime!("'1' === 1", value: "false");
    assert_runtime!("'ab' === 'a' + 'b'", value: "true");
    assert_runtime!("let o = {}; let p = o; o === p", value: "true");
}

#[test]
fn logical_operators_short_circuit() {
    assert_runtime!("let c = 0; 1 || (c = 5); c", value: "0");
    assert_runtime!("0 && missing", value: "0");
    assert_runtime!("1 && 2", value: "2");
    assert_runtime!("0 || 'a'", value: r#""a""#);
    assert_runtime!("!0", value: "true");
    assert_runtime!("!'a'", value: "false");
}

#[test]
fn ternary() {
    assert_runtime!("1 < 2 ? 'y' : 'n'", value: r#""y""#);
    assert_runtime!("0 ? 1 : 2", value: "2");
    assert_runtime!("let c = 0; 1 ? 1 : (c = 9); c", value: "0");
}

#[test]
fn typeof_operator() {
    assert_runtime!("typeof 1", value: r#""number""#);
    assert_runtime!("typeof 'a'", value: r#""string""#);
    assert_runtime!("typeof {}", value: r#""object""#);
    assert_runtime!("typeof null", value: r#""null""#);
    assert_runtime!("typeof undefined", value: r#""undefined""#);
    assert_runtime!("typeof print", value: r#""function""#);
    assert_runtime!("typeof function() {}", value: r#""function""#);
    assert_runtime!("typeof true", value: r#""boolean""#);
}

#[test]
fn if_else() {
    assert_runtime!("let r = 0; if (1 > 2) { r = 1; } else { r = 2; } r", value: "2");
    assert_runtime!("let r = 0; if (1) r = 1; else r = 2; r", value: "1");
    assert_runtime!(
        "let r = 0; if (0) r = 1; else if (1) r = 2; else r = 3; r",
        value: "2"
    );
}

#[test]
fn break_and_continue() {
    assert_runtime!(
        "let s = 0;\n\
         for (let i = 0; i < 10; i++) { if (i === 5) break; if (i % 2) continue; s += i; }\n\
         s",
        value: "6"
    );
}

#[test]
fn break_inside_taken_branch_with_else() {
    assert_runtime!(
        "let n = 0; for (;;) { n++; if (n > 2) { break; } else { n += 10; } } n",
        value: "12"
    );
}

#[test]
fn misplaced_control_flow() {
    assert_runtime!("break;", error: ErrorKind::Semantic, "not in loop");
    assert_runtime!("continue;", error: ErrorKind::Semantic, "not in loop");
    assert_runtime!("return 1;", error: ErrorKind::Semantic, "not in func");
    assert_runtime!(
        "function f() { break; } for (let i = 0; i < 1; i++) { f(); }",
        error: ErrorKind::Semantic,
        "not in loop"
    );
}

#[test]
fn redeclaration_and_shadowing() {
    assert_runtime!("let a = 1; let a = 2;", error: ErrorKind::Semantic, "'a' already declared");
    assert_runtime!("let a = 1; { let a = 2; } a", value: "1");
    assert_runtime!("{ let b = 1; } b", error: ErrorKind::Reference, "'b' not found");
    assert_runtime!(
        "function g() { let inner = 1; return inner; } g(); inner",
        error: ErrorKind::Reference,
        "'inner' not found"
    );
}

#[test]
fn scoping_is_dynamic() {
    assert_runtime!(
        "function get() { return v; } function wrap() { let v = 7; return get(); } wrap()",
        value: "7"
    );
}

#[test]
fn recursion() {
    assert_runtime!(
        "function fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } fib(10)",
        value: "55"
    );
}

#[test]
fn return_inside_loop_ends_function() {
    assert_runtime!(
        "function first() {\n\
           for (let i = 0; i < 10; i++) { if (i === 3) return i; }\n\
           return -1;\n\
         }\n\
         first()",
        value: "3"
    );
}

#[test]
fn missing_return_gives_undefined() {
    assert_runtime!("function f() { 1; } f()", value: "undefined");
    assert_runtime!("function f() { return; } f()", value: "undefined");
    assert_runtime!("function f(a, b) { return b; } f(1)", value: "undefined");
    assert_runtime!("function f(a) { return a; } f(1, 2, 3)", value: "1");
}

#[test]
fn immediately_called_function_literal() {
    assert_runtime!("(function(a) { return a * 2; })(21)", value: "42");
}

#[test]
fn member_access() {
    assert_runtime!("let o = {a: 1}; o.b", value: "undefined");
    assert_runtime!("let o = {a: 1}; o.a = 5; o.a", value: "5");
    assert_runtime!("let o = {inner: {v: 'deep'}}; o.inner.v", value: r#""deep""#);
    assert_runtime!("'abc'.length", value: "3");
    assert_runtime!("let o = {f: function(x) { return x + 1; }}; o.f(1)", value: "2");
}

#[test]
fn type_errors() {
    assert_runtime!("'a' < 'b'", error: ErrorKind::Type, "bad str op");
    assert_runtime!("'a' + 1", error: ErrorKind::Type, "type mismatch");
    assert_runtime!("let n = 1; n()", error: ErrorKind::Type, "calling non-function");
    assert_runtime!("let n = 1; n.x", error: ErrorKind::Type, "lookup in non-obj");
}

#[test]
fn bad_assignment_target() {
    assert_runtime!("1 = 2", error: ErrorKind::Semantic, "bad lhs");
    assert_runtime!("let o = {}; o.x = 1;", error: ErrorKind::Semantic, "bad lhs");
}

#[test]
fn syntax_errors() {
    assert_runtime!("let = 1;", error: ErrorKind::Syntax, "unexpected '='");
    assert_runtime!("1 2", error: ErrorKind::Syntax, "; expected");
    assert_runtime!("(1 + 2", error: ErrorKind::Syntax, ") expected");
    assert_runtime!("'open", error: ErrorKind::Syntax, "unterminated string");
    assert_runtime!("1 /* open", error: ErrorKind::Syntax, "unterminated comment");
    assert_runtime!("while (1) {}", error: ErrorKind::Syntax, "'while' not implemented");
    assert_runtime!("{ 1 }", error: ErrorKind::Syntax, "; expected");
}

#[test]
fn syntax_errors_in_untaken_code_are_reported() {
    assert_runtime!("if (0) { 1 + ; }", error: ErrorKind::Syntax, "bad expr");
    assert_runtime!("function f() { let = 1; }", error: ErrorKind::Syntax, "unexpected");
}

#[test]
fn error_stops_evaluation() {
    let out = run("print(1); missing; print(2);");
    assert_eq!(out.output, vec!["1"]);
    assert!(out.error.is_some());
}

#[test]
fn same_expression_twice() {
    assert_runtime!("let a = 3; let o = {k: a * 2}; (o.k + a) === (o.k + a)", value: "true");
}

#[test]
fn print_builtin() {
    assert_runtime!("print('a', 1, {x: 'y'})", output: vec![r#"a 1 {"x":"y"}"#]);
    assert_runtime!("for (let i = 0; i < 3; i++) print(i);", output: vec!["0", "1", "2"]);
}

#[test]
fn str_builtin() {
    assert_runtime!("str(12) + '!'", value: r#""12!""#);
    assert_runtime!("str()", error: ErrorKind::Type, "str() takes 1 argument(s), got 0");
}

#[test]
fn stats_builtin() {
    assert_runtime!("let s = stats(); s.total", value: "8192");
    assert_runtime!("let s = stats(); s.used > 0 && s.lwm < s.total", value: "true");
}

#[test]
fn depth_guard_stops_runaway_recursion() {
    assert_runtime!(
        "function r(n) { return r(n + 1); } r(0)",
        error: ErrorKind::Resource,
        "recursion too deep"
    );
}

#[test]
fn depth_guard_stops_deep_nesting() {
    let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
    let out = run(&deep);
    assert_eq!(out.error, Some((ErrorKind::Resource, "recursion too deep".to_owned())));

    let shallow = format!("{}1{}", "(".repeat(40), ")".repeat(40));
    assert_runtime!(&shallow, value: "1");

    let config = RuntimeConfig { max_depth: 20, ..RuntimeConfig::default() };
    let out = run_with(&shallow, 8192, config);
    assert_eq!(out.error.map(|(kind, _)| kind), Some(ErrorKind::Resource));
}

#[test]
fn out_of_memory_is_an_error() {
    let src = "let s = 'aaaaaaaaaaaaaaaa'; for (let i = 0; i < 100; i++) { s = s + s; }";
    let out = run_with(src, 1024, RuntimeConfig::default());
    let (kind, msg) = out.error.expect("Expected an error");
    assert_eq!(kind, ErrorKind::Resource);
    assert!(msg.contains("oom"), "got: {msg}");
}

fn evaluate(rt: &mut Runtime<'_>, args: Args) -> Value {
    let v = rt.arg(args, 0);
    let Some(src) = rt.as_str(v).map(str::to_owned) else {
        return rt.mk_err(ErrorKind::Type, format_args!("string expected"));
    };
    rt.eval(&src)
}

fn host_runtime(mem: &mut [u8]) -> Runtime<'_> {
    let mut rt = Runtime::new(mem).unwrap();
    let f = rt.mk_native(evaluate);
    let global = rt.global();
    rt.set(global, "evaluate", f).unwrap();
    rt
}

#[test]
fn natives_can_reenter_the_engine() {
    let mut mem = vec![0u8; 4096];
    let mut rt = host_runtime(&mut mem);
    assert_eq!(rt.eval("let x = 4; evaluate('x * 2') + 1").as_number(), Some(9.0));
    assert_eq!(
        rt.eval("function f(y) { return evaluate('y + 1') * 10; } f(1)").as_number(),
        Some(20.0)
    );
    let err = rt.eval("evaluate('nope')");
    assert!(err.is_err());
    assert_eq!(rt.error_message(), "'nope' not found");
}

#[test]
fn host_api_round_trip() {
    let mut mem = vec![0u8; 4096];
    let mut rt = Runtime::new(&mut mem).unwrap();
    let s = rt.mk_str("hello");
    let global = rt.global();
    rt.set(global, "greeting", s).unwrap();
    rt.set(global, "flag", Value::TRUE).unwrap();
    let v = rt.eval("greeting + ' world'");
    assert_eq!(v.kind(), Kind::Str);
    assert_eq!(rt.as_str(v), Some("hello world"));
    assert_eq!(rt.str_bytes(v), Some(&b"hello world"[..]));
    assert_eq!(rt.eval("flag").as_bool(), Some(true));
    assert_eq!(rt.type_name(v), "string");
    assert_eq!(rt.display(Value::number(2.5)).to_string(), "2.5");

    let err = rt.mk_err(ErrorKind::Type, format_args!("custom {}", 1));
    assert!(err.is_err());
    assert_eq!(rt.display(err).to_string(), "ERROR: custom 1");
    assert_eq!(rt.error_kind(), Some(ErrorKind::Type));
}

#[test]
fn state_persists_between_evals() {
    let mut mem = vec![0u8; 4096];
    let mut rt = Runtime::new(&mut mem).unwrap();
    rt.eval("let n = 1; function inc() { n += 1; return n; }");
    rt.eval("inc();");
    assert_eq!(rt.eval("inc()").as_number(), Some(3.0));
}

#[test]
fn oversized_source_is_rejected() {
    let mut mem = vec![0u8; 256];
    let mut rt = Runtime::new(&mut mem).unwrap();
    let src = " ".repeat(pocketjs::value::MAX_CODE_LEN + 1);
    assert!(rt.eval(&src).is_err());
    assert_eq!(rt.error_kind(), Some(ErrorKind::Resource));
}

#[test]
fn depth_limit_can_change_at_runtime() {
    let mut mem = vec![0u8; 4096];
    let mut rt = Runtime::new(&mut mem).unwrap();
    let src = "function down(n) { if (n < 1) return 0; return down(n - 1) + 1; } down(10)";
    assert_eq!(rt.eval(src).as_number(), Some(10.0));
    rt.set_max_depth(8);
    assert!(rt.eval("down(10)").is_err());
    assert_eq!(rt.error_message(), "recursion too deep");
    rt.set_max_depth(0);
    assert_eq!(rt.eval("down(10)").as_number(), Some(10.0));
    assert!(rt.stats().max_depth > 8);
}
