//! Scopes and function calls.
//!
//! A call re-points the evaluator at the argument text, evaluates it in the
//! caller's scope, then switches to the function's own text for parameter
//! binding and the body. Everything that must survive a collection in between
//! (the callee, the code being left, the arguments) sits on the argument stack.

use crate::arena::gc::GC_DISABLED;
use crate::arena::heap_ref;
use crate::runtime::eval::{Eval, Evaluator, Flags};
use crate::runtime::{Args, Code};
use crate::syntax::token::Token;
use crate::value::{Kind, Value};

impl Evaluator<'_, '_, '_> {
    pub(super) fn push_scope(&mut self) -> Result<(), Value> {
        match self.rt.arena.new_object(self.rt.scope) {
            Some(scope) => {
                self.rt.scope = scope;
                Ok(())
            }
            None => Err(self.oom()),
        }
    }

    pub(super) fn pop_scope(&mut self) {
        self.rt.scope = self.rt.arena.parent(self.rt.scope);
    }

    /// Skips over `(args)` without running it. Returns a deferred reference to
    /// the text between the parentheses.
    pub(super) fn call_params(&mut self) -> Eval {
        let start = self.pos;
        self.suppressed(|ev| {
            ev.consumed = true;
            if ev.next() != Token::RParen {
                loop {
                    ev.expr()?;
                    if ev.next() != Token::Comma {
                        break;
                    }
                    ev.consumed = true;
                }
            }
            Ok(Value::UNDEFINED)
        })?;
        self.expect(Token::RParen)?;
        Ok(Value::code_ref(start, self.toff - start))
    }

    /// Calls `func` with the argument text referenced by `args`.
    pub(super) fn call(&mut self, func: Value, args: Value) -> Eval {
        if !matches!(func.kind(), Kind::Func | Kind::Native) {
            return Err(fail!(self, Type, "calling non-function"));
        }
        let (off, len) = args.code_ref_parts();
        let saved = self.cursor();
        let outer = self.rt.code;
        self.rt.code = outer.narrow(off, len);
        self.seek(0);
        let res = match func.kind() {
            Kind::Func => self.call_script(func.offset()),
            _ => self.call_native(func.offset() as usize),
        };
        self.rt.code = outer.relocated(self.rt.code);
        self.restore(saved);
        if res.is_err() {
            self.abort();
        }
        res
    }

    fn call_script(&mut self, func: u32) -> Eval {
        let mark = self.rt.arena.top();
        let guarded = self.rt.protected != GC_DISABLED;
        if guarded {
            let prev = match self.rt.protected {
                0 => Value::UNDEFINED,
                off => heap_ref(Kind::Str, off),
            };
            if !self.rt.arena.push(prev) {
                return Err(self.oom());
            }
            self.rt.protected = func;
        }
        let res = self.call_protected(func, guarded);
        if guarded {
            let prev = self.rt.arena.slot(mark, 0);
            self.rt.protected = if prev.kind() == Kind::Str { prev.offset() } else { 0 };
        }
        self.rt.arena.pop_to(mark);
        res
    }

    fn call_protected(&mut self, func: u32, guarded: bool) -> Eval {
        let args_mark = self.rt.arena.top();
        let argc = self.push_args()?;
        // argument evaluation may have moved the function text
        let func = if guarded { self.rt.protected } else { func };
        self.push_scope()?;
        let len = self.rt.arena.str_len(func);
        let res = match self.rt.enter_code(Code::Arena { entity: func, start: 0, len }) {
            Ok(saved) => {
                let res = self.invoke(args_mark, argc);
                self.rt.leave_code(saved);
                res
            }
            Err(e) => Err(e),
        };
        self.pop_scope();
        res
    }

    /// Binds parameters from the argument slots and runs the body.
    fn invoke(&mut self, args_mark: u32, argc: u32) -> Eval {
        self.seek(0);
        self.expect(Token::LParen)?;
        let mut i = 0;
        while self.next() != Token::RParen {
            self.expect(Token::Identifier)?;
            let (off, len) = (self.toff, self.tlen);
            let v = if i < argc { self.rt.arena.slot(args_mark, i) } else { Value::UNDEFINED };
            let key = self.string_from_code(off, len)?;
            let scope = self.rt.scope;
            if self.rt.arena.set_prop(scope, key, v).is_none() {
                return Err(self.oom());
            }
            i += 1;
            if self.next() == Token::Comma {
                self.consumed = true;
            }
        }
        self.consumed = true;
        self.expect(Token::LBrace)?;
        let body = self.pos;
        let len = self.code_len().saturating_sub(body + 1);
        self.rt.code = self.rt.code.narrow(body, len);
        self.flags = Flags::CALL;
        let res = self.run()?;
        Ok(if self.flags.contains(Flags::RETURN) { res } else { Value::UNDEFINED })
    }

    fn call_native(&mut self, index: usize) -> Eval {
        let mark = self.rt.arena.top();
        let res = self.native_with_args(index, mark);
        self.rt.arena.pop_to(mark);
        res
    }

    fn native_with_args(&mut self, index: usize, mark: u32) -> Eval {
        let argc = self.push_args()?;
        let Some(&f) = self.rt.natives.get(index) else {
            return Err(fail!(self, Type, "calling non-function"));
        };
        tracing::trace!(target: "pocketjs::eval", index, argc, "native call");
        let res = f(&mut *self.rt, Args { mark, len: argc });
        self.rt.arena.note_usage();
        if res.is_err() { Err(res) } else { Ok(res) }
    }

    /// Evaluates the comma separated arguments of the current region onto the stack.
    fn push_args(&mut self) -> Result<u32, Value> {
        let mut argc = 0;
        while !matches!(self.next(), Token::Eof | Token::RParen) {
            let v = self.expr()?;
            let v = self.resolve(v);
            if !self.rt.arena.push(v) {
                return Err(fail!(self, Resource, "call oom"));
            }
            argc += 1;
            if self.next() != Token::Comma {
                break;
            }
            self.consumed = true;
        }
        if self.next() != Token::Eof {
            return Err(self.unexpected());
        }
        Ok(argc)
    }
}
