//! Host natives shipped with pocketjs.
//!
//! The engine itself defines no globals; hosts that want these call [`install`].

use std::fmt::Write;

use crate::diagnostics::ErrorKind;
use crate::runtime::{Args, NativeFn, Runtime};
use crate::value::{Kind, Value};

/// Built-in functions available to scripts after [`install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// Appends its arguments to the runtime output
    Print,
    /// Stringifies a value
    Str,
    /// Runs a collection pass
    Gc,
    /// Reports memory and nesting usage
    Stats,
}

impl Builtin {
    pub const ALL: [Builtin; 4] = [Builtin::Print, Builtin::Str, Builtin::Gc, Builtin::Stats];

    /// Global name the builtin is bound to.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Str => "str",
            Builtin::Gc => "gc",
            Builtin::Stats => "stats",
        }
    }

    /// Argument count, `None` for variadic.
    #[inline]
    pub const fn arity(self) -> Option<usize> {
        match self {
            Builtin::Print => None,
            Builtin::Str => Some(1),
            Builtin::Gc | Builtin::Stats => Some(0),
        }
    }

    #[inline]
    pub fn from_name(name: &str) -> Option<Self> {
        Builtin::ALL.into_iter().find(|b| b.name() == name)
    }

    fn native(self) -> NativeFn {
        match self {
            Builtin::Print => print,
            Builtin::Str => stringify,
            Builtin::Gc => gc,
            Builtin::Stats => stats,
        }
    }
}

/// Binds every builtin in the global scope.
pub fn install(rt: &mut Runtime<'_>) -> Result<(), Value> {
    for builtin in Builtin::ALL {
        let f = rt.mk_native(builtin.native());
        let global = rt.global();
        rt.set(global, builtin.name(), f)?;
    }
    Ok(())
}

fn check_arity(rt: &mut Runtime<'_>, builtin: Builtin, args: Args) -> Result<(), Value> {
    match builtin.arity() {
        Some(n) if n != args.len() => Err(rt.mk_err(
            ErrorKind::Type,
            format_args!("{}() takes {n} argument(s), got {}", builtin.name(), args.len()),
        )),
        _ => Ok(()),
    }
}

fn print(rt: &mut Runtime<'_>, args: Args) -> Value {
    let mut line = String::new();
    for (i, v) in rt.args(args).enumerate() {
        if i > 0 {
            line.push(' ');
        }
        let _ = match (v.kind(), rt.str_bytes(v)) {
            (Kind::Str, Some(bytes)) => {
                line.push_str(&String::from_utf8_lossy(bytes));
                Ok(())
            }
            _ => write!(line, "{}", rt.display(v)),
        };
    }
    rt.output.push(line);
    Value::UNDEFINED
}

fn stringify(rt: &mut Runtime<'_>, args: Args) -> Value {
    if let Err(e) = check_arity(rt, Builtin::Str, args) {
        return e;
    }
    let v = rt.arg(args, 0);
    let text = rt.display(v).to_string();
    rt.mk_str(&text)
}

fn gc(rt: &mut Runtime<'_>, args: Args) -> Value {
    if let Err(e) = check_arity(rt, Builtin::Gc, args) {
        return e;
    }
    Value::number(rt.gc() as f64)
}

fn stats(rt: &mut Runtime<'_>, args: Args) -> Value {
    if let Err(e) = check_arity(rt, Builtin::Stats, args) {
        return e;
    }
    let s = rt.stats();
    let obj = rt.mk_obj();
    if obj.is_err() {
        return obj;
    }
    let fields = [
        ("total", s.total as f64),
        ("used", s.used as f64),
        ("lwm", s.low_watermark as f64),
        ("depth", f64::from(s.max_depth)),
    ];
    for (key, n) in fields {
        if let Err(e) = rt.set(obj, key, Value::number(n)) {
            return e;
        }
    }
    obj
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for b in Builtin::ALL {
            assert_eq!(Builtin::from_name(b.name()), Some(b));
        }
        assert_eq!(Builtin::from_name("eval"), None);
    }
}
