//! Operator semantics.

use crate::arena::heap_ref;
use crate::runtime::eval::{Eval, Evaluator};
use crate::syntax::token::Token;
use crate::value::{Kind, Value};

impl Evaluator<'_, '_, '_> {
    /// Applies `op`. Unary operators take their operand in `rhs`; assignments
    /// and postfix operators need `lhs` to be a property reference.
    pub(super) fn do_op(&mut self, op: Token, lhs: Value, rhs: Value) -> Eval {
        if !self.exec() {
            return Ok(Value::number(0.0));
        }
        let l = self.resolve(lhs);
        let r = self.resolve(rhs);
        self.rt.arena.note_usage();
        if (op.is_assign() || matches!(op, Token::PostInc | Token::PostDec))
            && lhs.kind() != Kind::Prop
        {
            return Err(fail!(self, Semantic, "bad lhs"));
        }
        match op {
            Token::Typeof => return self.new_str(r.kind().type_name().as_bytes()),
            Token::Call => return self.call(l, rhs),
            Token::Assign => return Ok(self.assign(lhs, r)),
            Token::PostInc | Token::PostDec => {
                let base = if op == Token::PostInc { Token::Plus } else { Token::Minus };
                let updated = self.do_op(base, l, Value::number(1.0))?;
                self.assign(lhs, updated);
                return Ok(l);
            }
            Token::Dot => return self.member(l, rhs),
            Token::Not => return Ok(Value::boolean(!self.truthy(r))),
            _ => {}
        }
        if let Some(base) = op.assign_base() {
            let v = self.do_op(base, l, r)?;
            return Ok(self.assign(lhs, v));
        }
        if l.kind() == Kind::Str && r.kind() == Kind::Str {
            return self.string_op(op, l, r);
        }
        let both_numbers = l.kind() == Kind::Number && r.kind() == Kind::Number;
        if matches!(op, Token::Eq | Token::Ne) && !both_numbers {
            return Ok(Value::boolean((l == r) == (op == Token::Eq)));
        }
        let numeric = if op.is_unary() { r.kind() == Kind::Number } else { both_numbers };
        if !numeric {
            return Err(fail!(self, Type, "type mismatch"));
        }
        let (a, b) = (l.to_f64(), r.to_f64());
        let n = match op {
            Token::Div if b == 0.0 => return Err(fail!(self, Semantic, "div by zero")),
            Token::Div => a / b,
            Token::Rem => a % b,
            Token::Mul => a * b,
            Token::Plus => a + b,
            Token::Minus => a - b,
            Token::Xor => ((a as i64) ^ (b as i64)) as f64,
            Token::And => ((a as i64) & (b as i64)) as f64,
            Token::Or => ((a as i64) | (b as i64)) as f64,
            Token::Shl => (a as i64).wrapping_shl(b as i64 as u32) as f64,
            Token::Shr => (a as i64).wrapping_shr(b as i64 as u32) as f64,
            Token::Zshr => (a as i64 as u64).wrapping_shr(b as i64 as u32) as f64,
            Token::UMinus => -b,
            Token::UPlus => b,
            Token::Tilde => !(b as i64) as f64,
            Token::Lt => return Ok(Value::boolean(a < b)),
            Token::Le => return Ok(Value::boolean(a <= b)),
            Token::Gt => return Ok(Value::boolean(a > b)),
            Token::Ge => return Ok(Value::boolean(a >= b)),
            Token::Eq => return Ok(Value::boolean(a == b)),
            Token::Ne => return Ok(Value::boolean(a != b)),
            _ => return Err(fail!(self, Syntax, "unknown op '{op}'")),
        };
        Ok(Value::number(n))
    }

    #[inline]
    fn assign(&mut self, prop: Value, v: Value) -> Value {
        self.rt.arena.set_prop_value(prop.offset(), v);
        prop
    }

    fn new_str(&mut self, bytes: &[u8]) -> Eval {
        match self.rt.arena.new_string_from(bytes) {
            Some(s) => Ok(heap_ref(Kind::Str, s)),
            None => Err(self.oom()),
        }
    }

    /// `obj.name`: a reference to an own property, `undefined` when missing.
    fn member(&mut self, obj: Value, name: Value) -> Eval {
        if name.kind() != Kind::CodeRef {
            return Err(fail!(self, Syntax, "bad member name"));
        }
        let (off, len) = name.code_ref_parts();
        if obj.kind() == Kind::Str && self.text(off, len) == b"length" {
            let n = self.rt.arena.str_len(obj.offset());
            return Ok(Value::number(f64::from(n)));
        }
        if obj.kind() != Kind::Object {
            return Err(fail!(self, Type, "lookup in non-obj"));
        }
        match self.rt.arena.find_prop(obj.offset(), self.text(off, len)) {
            0 => Ok(Value::UNDEFINED),
            prop => Ok(heap_ref(Kind::Prop, prop)),
        }
    }

    fn string_op(&mut self, op: Token, l: Value, r: Value) -> Eval {
        let (a, b) = (l.offset(), r.offset());
        match op {
            Token::Plus => {
                let (n1, n2) = (self.rt.arena.str_len(a), self.rt.arena.str_len(b));
                let Some(s) = self.rt.arena.new_string(n1 + n2) else {
                    return Err(self.oom());
                };
                self.rt.arena.copy_str_into(a, s, 0);
                self.rt.arena.copy_str_into(b, s, n1);
                Ok(heap_ref(Kind::Str, s))
            }
            Token::Eq | Token::Ne => {
                let same = self.rt.arena.str_bytes(a) == self.rt.arena.str_bytes(b);
                Ok(Value::boolean(same == (op == Token::Eq)))
            }
            _ => Err(fail!(self, Type, "bad str op")),
        }
    }
}
