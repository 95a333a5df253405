//! The re-parsing evaluator.
//!
//! There is no syntax tree. Each production scans its tokens straight out of the
//! current code region and computes its value on the spot; loop bodies and
//! function bodies are simply scanned again. Code that must be parsed but not
//! run (the untaken branch of an `if`, a function body at definition time,
//! the right side of a short-circuit) is walked with [`Flags::NOEXEC`] set.

use std::fmt;

use crate::arena::heap_ref;
use crate::diagnostics::{AsStr, ErrorKind};
use crate::runtime::{Code, Runtime};
use crate::syntax::scanner::{self, LexError, Token};
use crate::value::{Kind, Value};

/// Result of a production: `Err` carries the engine's error value.
pub(crate) type Eval = Result<Value, Value>;

bitflags::bitflags! {
    /// Evaluator state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct Flags: u8 {
        /// Parse only, run nothing.
        const NOEXEC = 1 << 0;
        const LOOP = 1 << 1;
        const CALL = 1 << 2;
        const BREAK = 1 << 3;
        const RETURN = 1 << 4;
    }
}

/// Token cursor state saved across a call.
#[derive(Clone, Copy)]
pub(super) struct Cursor {
    pos: u32,
    tok: Token,
    toff: u32,
    tlen: u32,
    consumed: bool,
    flags: Flags,
}

/// Copy of a short piece of code text for error messages.
pub(super) struct Snippet {
    buf: [u8; 32],
    len: usize,
}

impl fmt::Display for Snippet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for chunk in self.buf[..self.len].utf8_chunks() {
            f.write_str(chunk.valid())?;
        }
        Ok(())
    }
}

pub(crate) struct Evaluator<'r, 'mem, 'src> {
    pub(super) rt: &'r mut Runtime<'mem>,
    /// Source of the innermost `eval`, for [`Code::Host`] regions.
    src: &'src [u8],
    pub(super) pos: u32,
    pub(super) tok: Token,
    pub(super) toff: u32,
    pub(super) tlen: u32,
    /// Whether `tok` has been used up and the next call to `next` must scan.
    pub(super) consumed: bool,
    pub(super) flags: Flags,
    lex_error: Option<LexError>,
}

impl<'r, 'mem, 'src> Evaluator<'r, 'mem, 'src> {
    pub(crate) fn new(rt: &'r mut Runtime<'mem>, src: &'src [u8]) -> Self {
        Evaluator {
            rt,
            src,
            pos: 0,
            tok: Token::Err,
            toff: 0,
            tlen: 0,
            consumed: true,
            flags: Flags::empty(),
            lex_error: None,
        }
    }

    // ---- code region and token cursor ----

    pub(super) fn code(&self) -> &[u8] {
        match self.rt.code {
            Code::Host { start, len } => &self.src[start as usize..(start + len) as usize],
            Code::Arena { entity, start, len } => self.rt.arena.bytes(entity + 4 + start, len),
        }
    }

    #[inline]
    pub(super) fn code_len(&self) -> u32 {
        self.rt.code.len()
    }

    /// Code text at `off..off + len` of the current region.
    #[inline]
    pub(super) fn text(&self, off: u32, len: u32) -> &[u8] {
        &self.code()[off as usize..(off + len) as usize]
    }

    pub(super) fn snippet(&self, off: u32, len: u32) -> Snippet {
        let text = self.text(off, len);
        let mut s = Snippet { buf: [0; 32], len: text.len().min(32) };
        s.buf[..s.len].copy_from_slice(&text[..s.len]);
        s
    }

    /// The current token, scanning a new one if the last was consumed.
    pub(super) fn next(&mut self) -> Token {
        if !self.consumed {
            return self.tok;
        }
        self.consumed = false;
        let t = scanner::scan(self.code(), self.pos);
        self.tok = t.token;
        self.toff = t.span.start;
        self.tlen = t.span.end - t.span.start;
        self.pos = t.span.end;
        self.lex_error = t.error;
        self.tok
    }

    /// The token after the current one, without moving.
    pub(super) fn lookahead(&self) -> Token {
        scanner::scan(self.code(), self.pos).token
    }

    #[inline]
    pub(super) fn seek(&mut self, pos: u32) {
        self.pos = pos;
        self.consumed = true;
    }

    #[inline]
    pub(super) fn exec(&self) -> bool {
        !self.flags.contains(Flags::NOEXEC)
    }

    pub(super) fn cursor(&self) -> Cursor {
        Cursor {
            pos: self.pos,
            tok: self.tok,
            toff: self.toff,
            tlen: self.tlen,
            consumed: self.consumed,
            flags: self.flags,
        }
    }

    pub(super) fn restore(&mut self, c: Cursor) {
        self.pos = c.pos;
        self.tok = c.tok;
        self.toff = c.toff;
        self.tlen = c.tlen;
        self.consumed = c.consumed;
        self.flags = c.flags;
    }

    // ---- errors ----

    /// Records the error and skips to the end of the current region.
    pub(super) fn error(&mut self, kind: ErrorKind, args: fmt::Arguments<'_>) -> Value {
        let v = self.rt.mk_err(kind, args);
        self.abort();
        v
    }

    pub(super) fn abort(&mut self) {
        self.pos = self.code_len();
        self.tok = Token::Eof;
        self.consumed = false;
    }

    pub(super) fn oom(&mut self) -> Value {
        fail!(self, Resource, "oom")
    }

    pub(super) fn unexpected(&mut self) -> Value {
        match self.tok {
            Token::Err => {
                let msg = self.lex_error.map_or("parse error", |e| e.as_str());
                fail!(self, Syntax, "{msg}")
            }
            Token::Eof => fail!(self, Syntax, "unexpected end of input"),
            tok => fail!(self, Syntax, "unexpected '{tok}'"),
        }
    }

    /// Consumes `tok` or fails.
    pub(super) fn expect(&mut self, tok: Token) -> Result<(), Value> {
        if self.next() != tok {
            return Err(self.unexpected());
        }
        self.consumed = true;
        Ok(())
    }

    // ---- evaluation helpers ----

    /// Increments the nesting counter around `f`.
    pub(super) fn nested(&mut self, f: impl FnOnce(&mut Self) -> Eval) -> Eval {
        self.rt.depth += 1;
        self.rt.peak_depth = self.rt.peak_depth.max(self.rt.depth);
        let res = if self.rt.max_depth != 0 && self.rt.depth > self.rt.max_depth {
            Err(fail!(self, Resource, "recursion too deep"))
        } else {
            f(self)
        };
        self.rt.depth -= 1;
        res
    }

    /// Runs `f` with execution suppressed, then puts the flags back.
    pub(super) fn suppressed(&mut self, f: impl FnOnce(&mut Self) -> Eval) -> Eval {
        let flags = self.flags;
        self.flags |= Flags::NOEXEC;
        let res = f(self);
        self.flags = flags;
        res
    }

    /// Runs `f` with `keep` on the argument stack so a collection inside `f`
    /// keeps it alive. Returns `keep` at its possibly moved offset and `f`'s result.
    pub(super) fn rooted(
        &mut self,
        keep: Value,
        f: impl FnOnce(&mut Self) -> Eval,
    ) -> Result<(Value, Value), Value> {
        if !self.exec() || !keep.kind().is_heap() {
            let v = f(self)?;
            return Ok((keep, v));
        }
        let mark = self.rt.arena.top();
        if !self.rt.arena.push(keep) {
            return Err(self.oom());
        }
        let res = f(self);
        let keep = self.rt.arena.slot(mark, 0);
        self.rt.arena.pop_to(mark);
        Ok((keep, res?))
    }

    /// Follows property references to the value they hold.
    pub(super) fn resolve(&self, mut v: Value) -> Value {
        while v.kind() == Kind::Prop {
            v = self.rt.arena.prop_value(v.offset());
        }
        v
    }

    pub(super) fn truthy(&self, v: Value) -> bool {
        match v.kind() {
            Kind::Bool => v.payload() != 0,
            Kind::Number => {
                let n = v.to_f64();
                n != 0.0 && !n.is_nan()
            }
            Kind::Object | Kind::Func | Kind::Native => true,
            Kind::Str => self.rt.arena.str_len(v.offset()) > 0,
            _ => false,
        }
    }

    /// New string entity holding code text `off..off + len`.
    pub(super) fn string_from_code(&mut self, off: u32, len: u32) -> Result<u32, Value> {
        let src = self.src;
        let s = match self.rt.code {
            Code::Host { start, .. } => {
                let from = (start + off) as usize;
                self.rt.arena.new_string_from(&src[from..from + len as usize])
            }
            Code::Arena { entity, start, .. } => {
                self.rt.arena.new_string_within(entity + 4 + start + off, len)
            }
        };
        s.ok_or_else(|| self.oom())
    }

    /// Binds `name` in the current scope, refusing redeclaration.
    fn declare(&mut self, off: u32, len: u32, v: Value) -> Result<(), Value> {
        let scope = self.rt.scope;
        if self.rt.arena.find_prop(scope, self.text(off, len)) != 0 {
            let name = self.snippet(off, len);
            return Err(fail!(self, Semantic, "'{name}' already declared"));
        }
        let key = self.string_from_code(off, len)?;
        match self.rt.arena.set_prop(scope, key, v) {
            Some(_) => Ok(()),
            None => Err(self.oom()),
        }
    }

    /// Resolves a deferred identifier through the scope chain.
    pub(super) fn lookup(&mut self, r: Value) -> Eval {
        if !self.exec() {
            return Ok(Value::number(0.0));
        }
        let (off, len) = r.code_ref_parts();
        let mut scope = self.rt.scope;
        loop {
            let prop = self.rt.arena.find_prop(scope, self.text(off, len));
            if prop != 0 {
                return Ok(heap_ref(Kind::Prop, prop));
            }
            if scope == 0 {
                break;
            }
            scope = self.rt.arena.parent(scope);
        }
        let name = self.snippet(off, len);
        Err(fail!(self, Reference, "'{name}' not found"))
    }

    // ---- statements ----

    /// Evaluates statements until the end of the region. Returns the last value.
    pub(crate) fn run(&mut self) -> Eval {
        self.seek(0);
        let mut res = Value::UNDEFINED;
        while self.next() != Token::Eof {
            res = self.stmt()?;
        }
        Ok(res)
    }

    pub(super) fn stmt(&mut self) -> Eval {
        self.nested(Self::statement)
    }

    fn statement(&mut self) -> Eval {
        if self.exec() && self.rt.arena.brk() > self.rt.gc_threshold {
            self.rt.gc();
        }
        let res = match self.next() {
            tok if tok.is_reserved() => return Err(fail!(self, Syntax, "'{tok}' not implemented")),
            Token::Continue => self.continue_stmt(),
            Token::Break => self.break_stmt(),
            Token::Let => self.let_stmt(),
            Token::If => self.if_stmt(),
            Token::LBrace => self.block(self.exec()),
            Token::For => self.for_stmt(),
            Token::Return => self.return_stmt(),
            Token::Function if self.lookahead() == Token::Identifier => self.function_decl(),
            Token::Semicolon => Ok(Value::UNDEFINED),
            _ => self.expr().map(|v| self.resolve(v)),
        }?;
        match self.next() {
            Token::Semicolon | Token::Eof | Token::RBrace => {
                self.consumed = true;
                Ok(res)
            }
            Token::Err => Err(self.unexpected()),
            _ => Err(fail!(self, Syntax, "; expected")),
        }
    }

    /// `{ stmt* }`, with the opening brace as the current token.
    pub(super) fn block(&mut self, create_scope: bool) -> Eval {
        if create_scope {
            self.push_scope()?;
        }
        let res = self.block_body();
        if create_scope {
            self.pop_scope();
        }
        res
    }

    fn block_body(&mut self) -> Eval {
        let mut res = Value::UNDEFINED;
        self.consumed = true;
        while !matches!(self.next(), Token::Eof | Token::RBrace) {
            let first = self.tok;
            res = self.stmt()?;
            if !matches!(first, Token::LBrace | Token::If) && self.tok != Token::Semicolon {
                return Err(fail!(self, Syntax, "; expected"));
            }
        }
        Ok(res)
    }

    /// A block, or a single statement whose terminator is left for the caller.
    fn block_or_stmt(&mut self) -> Eval {
        if self.next() == Token::LBrace {
            return self.block(self.exec());
        }
        let v = self.stmt()?;
        self.consumed = false;
        Ok(self.resolve(v))
    }

    fn let_stmt(&mut self) -> Eval {
        let exe = self.exec();
        self.consumed = true;
        loop {
            self.expect(Token::Identifier)?;
            let (off, len) = (self.toff, self.tlen);
            let mut v = Value::UNDEFINED;
            if self.next() == Token::Assign {
                self.consumed = true;
                v = self.expr()?;
            }
            if exe {
                let v = self.resolve(v);
                self.declare(off, len, v)?;
            }
            match self.next() {
                Token::Semicolon | Token::Eof => break,
                _ => self.expect(Token::Comma)?,
            }
        }
        Ok(Value::UNDEFINED)
    }

    fn if_stmt(&mut self) -> Eval {
        self.consumed = true;
        self.expect(Token::LParen)?;
        let cond = self.expr()?;
        let cond = self.resolve(cond);
        self.expect(Token::RParen)?;
        let taken = self.truthy(cond);
        let mut res = Value::UNDEFINED;
        if taken {
            res = self.block_or_stmt()?;
        } else {
            self.suppressed(Self::block_or_stmt)?;
        }
        if self.lookahead() == Token::Else {
            self.consumed = true;
            self.next();
            self.consumed = true;
            if taken {
                self.suppressed(Self::block_or_stmt)?;
            } else {
                res = self.block_or_stmt()?;
            }
        }
        Ok(res)
    }

    fn for_stmt(&mut self) -> Eval {
        let flags = self.flags;
        let exe = self.exec();
        if exe {
            self.push_scope()?;
        }
        let res = self.for_loop(flags);
        if exe {
            self.pop_scope();
        }
        self.flags = flags | (self.flags & Flags::RETURN);
        res
    }

    /// Walks the header and body once without running them to find their
    /// offsets, then re-scans condition, body and step for every iteration.
    fn for_loop(&mut self, flags: Flags) -> Eval {
        self.consumed = true;
        self.expect(Token::LParen)?;
        match self.next() {
            Token::Semicolon => {}
            Token::Let => {
                self.let_stmt()?;
            }
            _ => {
                self.expr()?;
            }
        }
        self.expect(Token::Semicolon)?;
        self.flags |= Flags::NOEXEC;
        let cond_pos = self.pos;
        if self.next() != Token::Semicolon {
            self.expr()?;
        }
        self.expect(Token::Semicolon)?;
        let step_pos = self.pos;
        if self.next() != Token::RParen {
            self.expr()?;
        }
        self.expect(Token::RParen)?;
        let body_pos = self.pos;
        self.block_or_stmt()?;
        let end_pos = self.pos;

        while !flags.contains(Flags::NOEXEC) {
            self.flags = flags;
            self.seek(cond_pos);
            if self.next() != Token::Semicolon {
                let cond = self.expr()?;
                let cond = self.resolve(cond);
                if !self.truthy(cond) {
                    break;
                }
            }
            self.seek(body_pos);
            self.flags |= Flags::LOOP;
            let v = self.block_or_stmt()?;
            if self.flags.contains(Flags::RETURN) {
                return Ok(v);
            }
            if self.flags.contains(Flags::BREAK) {
                break;
            }
            self.flags = flags;
            self.seek(step_pos);
            if self.next() != Token::RParen {
                self.expr()?;
            }
        }
        self.seek(end_pos);
        // the body's terminator is already behind us
        self.tok = Token::Semicolon;
        self.consumed = false;
        Ok(Value::UNDEFINED)
    }

    fn return_stmt(&mut self) -> Eval {
        let exe = self.exec();
        self.consumed = true;
        if exe && !self.flags.contains(Flags::CALL) {
            return Err(fail!(self, Semantic, "not in func"));
        }
        let res = match self.next() {
            Token::Semicolon | Token::Eof | Token::RBrace => Value::UNDEFINED,
            _ => {
                let v = self.expr()?;
                self.resolve(v)
            }
        };
        if exe {
            self.pos = self.code_len();
            self.flags |= Flags::RETURN;
        }
        Ok(res)
    }

    fn break_stmt(&mut self) -> Eval {
        self.consumed = true;
        if self.exec() {
            if !self.flags.contains(Flags::LOOP) {
                return Err(fail!(self, Semantic, "not in loop"));
            }
            self.flags |= Flags::BREAK | Flags::NOEXEC;
        }
        Ok(Value::UNDEFINED)
    }

    fn continue_stmt(&mut self) -> Eval {
        self.consumed = true;
        if self.exec() {
            if !self.flags.contains(Flags::LOOP) {
                return Err(fail!(self, Semantic, "not in loop"));
            }
            self.flags |= Flags::NOEXEC;
        }
        Ok(Value::UNDEFINED)
    }

    /// `function name(params) { body }` binds `name` like `let` does.
    fn function_decl(&mut self) -> Eval {
        self.consumed = true;
        self.expect(Token::Identifier)?;
        let (off, len) = (self.toff, self.tlen);
        let func = self.function_literal()?;
        if self.exec() {
            self.declare(off, len, func)?;
        }
        self.tok = Token::Semicolon;
        self.consumed = false;
        Ok(Value::UNDEFINED)
    }

    // ---- expressions ----

    pub(super) fn expr(&mut self) -> Eval {
        self.nested(Self::assignment)
    }

    /// Right-associative: `a = b = c` assigns `c` to `b` first.
    fn assignment(&mut self) -> Eval {
        let mut res = self.ternary()?;
        while self.next().is_assign() {
            let op = self.tok;
            self.consumed = true;
            let (lhs, rhs) = self.rooted(res, |ev| ev.nested(Self::assignment))?;
            res = self.do_op(op, lhs, rhs)?;
        }
        Ok(res)
    }

    fn ternary(&mut self) -> Eval {
        let res = self.logical_or()?;
        if self.next() != Token::Question {
            return Ok(res);
        }
        self.consumed = true;
        let cond = self.resolve(res);
        if self.truthy(cond) {
            let res = self.nested(Self::ternary)?;
            self.expect(Token::Colon)?;
            self.suppressed(|ev| ev.nested(Self::ternary))?;
            Ok(res)
        } else {
            self.suppressed(|ev| ev.nested(Self::ternary))?;
            self.expect(Token::Colon)?;
            self.nested(Self::ternary)
        }
    }

    fn logical_or(&mut self) -> Eval {
        let mut res = self.logical_and()?;
        let flags = self.flags;
        while self.next() == Token::LOr {
            self.consumed = true;
            res = self.resolve(res);
            if self.truthy(res) {
                self.flags |= Flags::NOEXEC;
            }
            let rhs = self.nested(Self::logical_and)?;
            if self.exec() {
                res = rhs;
            }
        }
        self.flags = flags;
        Ok(res)
    }

    fn logical_and(&mut self) -> Eval {
        let mut res = self.bitwise_or()?;
        let flags = self.flags;
        while self.next() == Token::LAnd {
            self.consumed = true;
            res = self.resolve(res);
            if !self.truthy(res) {
                self.flags |= Flags::NOEXEC;
            }
            let rhs = self.nested(Self::bitwise_or)?;
            if self.exec() {
                res = rhs;
            }
        }
        self.flags = flags;
        Ok(res)
    }

    /// Left-associative chain of `operand (op operand)*` for any of `ops`.
    fn binary(&mut self, ops: &[Token], operand: fn(&mut Self) -> Eval) -> Eval {
        let mut res = operand(self)?;
        while ops.contains(&self.next()) {
            let op = self.tok;
            self.consumed = true;
            let (lhs, rhs) = self.rooted(res, operand)?;
            res = self.do_op(op, lhs, rhs)?;
        }
        Ok(res)
    }

    fn bitwise_or(&mut self) -> Eval {
        self.binary(&[Token::Or], Self::bitwise_xor)
    }

    fn bitwise_xor(&mut self) -> Eval {
        self.binary(&[Token::Xor], Self::bitwise_and)
    }

    fn bitwise_and(&mut self) -> Eval {
        self.binary(&[Token::And], Self::equality)
    }

    fn equality(&mut self) -> Eval {
        self.binary(&[Token::Eq, Token::Ne], Self::relational)
    }

    fn relational(&mut self) -> Eval {
        self.binary(&[Token::Lt, Token::Le, Token::Gt, Token::Ge], Self::shift)
    }

    fn shift(&mut self) -> Eval {
        self.binary(&[Token::Shl, Token::Shr, Token::Zshr], Self::additive)
    }

    fn additive(&mut self) -> Eval {
        self.binary(&[Token::Plus, Token::Minus], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Eval {
        self.binary(&[Token::Mul, Token::Div, Token::Rem], Self::unary)
    }

    fn unary(&mut self) -> Eval {
        let op = match self.next() {
            Token::Not => Token::Not,
            Token::Tilde => Token::Tilde,
            Token::Typeof => Token::Typeof,
            Token::Minus => Token::UMinus,
            Token::Plus => Token::UPlus,
            _ => return self.postfix(),
        };
        self.consumed = true;
        let operand = self.nested(Self::unary)?;
        self.do_op(op, Value::UNDEFINED, operand)
    }

    fn postfix(&mut self) -> Eval {
        let res = self.call_dot()?;
        match self.next() {
            op @ (Token::PostInc | Token::PostDec) => {
                self.consumed = true;
                self.do_op(op, res, Value::UNDEFINED)
            }
            _ => Ok(res),
        }
    }

    /// A primary followed by any mix of `.name` and `(args)`.
    fn call_dot(&mut self) -> Eval {
        let mut res = self.group()?;
        if res.kind() == Kind::CodeRef {
            res = self.lookup(res)?;
        }
        loop {
            match self.next() {
                Token::Dot => {
                    self.consumed = true;
                    let name = self.group()?;
                    res = self.do_op(Token::Dot, res, name)?;
                }
                Token::LParen => {
                    let args = self.call_params()?;
                    res = self.do_op(Token::Call, res, args)?;
                }
                _ => return Ok(res),
            }
        }
    }

    fn group(&mut self) -> Eval {
        if self.next() != Token::LParen {
            return self.literal();
        }
        self.consumed = true;
        let v = self.expr()?;
        if self.next() != Token::RParen {
            return Err(fail!(self, Syntax, ") expected"));
        }
        self.consumed = true;
        Ok(v)
    }

    fn literal(&mut self) -> Eval {
        let tok = self.next();
        self.rt.arena.note_usage();
        if matches!(tok, Token::Err | Token::Eof) {
            return Err(self.unexpected());
        }
        self.consumed = true;
        match tok {
            Token::Number => {
                let text = self.text(self.toff, self.tlen);
                Ok(Value::number(scanner::parse_number(text)))
            }
            Token::String => self.string_literal(self.toff, self.tlen),
            Token::LBrace => self.object_literal(),
            Token::Function => {
                if self.next() == Token::Identifier {
                    self.consumed = true;
                }
                self.function_literal()
            }
            Token::Null => Ok(Value::NULL),
            Token::Undefined => Ok(Value::UNDEFINED),
            Token::True => Ok(Value::TRUE),
            Token::False => Ok(Value::FALSE),
            Token::Identifier => Ok(Value::code_ref(self.toff, self.tlen)),
            _ => Err(fail!(self, Syntax, "bad expr")),
        }
    }

    /// Decodes the quoted token at `off..off + len` into a new string.
    fn string_literal(&mut self, off: u32, len: u32) -> Eval {
        let quote = self.code()[off as usize];
        let (body_off, body_len) = (off + 1, len.saturating_sub(2));
        let mut n = 0u32;
        let mut i = 0usize;
        while i < body_len as usize {
            let step = scanner::unescape_at(self.text(body_off, body_len), i, quote);
            match step {
                Ok((_, used)) => {
                    i += used;
                    n += 1;
                }
                Err(e) => return Err(fail!(self, Syntax, "{}", e.as_str())),
            }
        }
        if !self.exec() {
            return Ok(Value::UNDEFINED);
        }
        let Some(s) = self.rt.arena.new_string(n) else {
            return Err(self.oom());
        };
        let mut i = 0usize;
        for j in 0..n {
            let (b, used) =
                scanner::unescape_at(self.text(body_off, body_len), i, quote).unwrap_or((0, 1));
            *self.rt.arena.str_byte_mut(s, j) = b;
            i += used;
        }
        Ok(heap_ref(Kind::Str, s))
    }

    /// `{ key: expr, ... }` with the opening brace already consumed.
    fn object_literal(&mut self) -> Eval {
        let exe = self.exec();
        let mark = self.rt.arena.top();
        if exe {
            let Some(obj) = self.rt.arena.new_object(0) else {
                return Err(self.oom());
            };
            if !self.rt.arena.push(heap_ref(Kind::Object, obj)) {
                return Err(self.oom());
            }
        }
        let res = self.object_members(exe, mark);
        let obj = if exe { self.rt.arena.slot(mark, 0) } else { Value::UNDEFINED };
        self.rt.arena.pop_to(mark);
        res.map(|()| obj)
    }

    fn object_members(&mut self, exe: bool, mark: u32) -> Result<(), Value> {
        while self.next() != Token::RBrace {
            let (key_tok, key_off, key_len) = match self.tok {
                Token::Identifier | Token::String => (self.tok, self.toff, self.tlen),
                _ => return Err(self.unexpected()),
            };
            self.consumed = true;
            self.expect(Token::Colon)?;
            let val = self.expr()?;
            if exe {
                let val = self.resolve(val);
                // the key is made after the value so it never needs rooting
                let key = if key_tok == Token::String {
                    self.string_literal(key_off, key_len)?.offset()
                } else {
                    self.string_from_code(key_off, key_len)?
                };
                let obj = self.rt.arena.slot(mark, 0).offset();
                if self.rt.arena.set_prop(obj, key, val).is_none() {
                    return Err(self.oom());
                }
            } else if key_tok == Token::String {
                self.string_literal(key_off, key_len)?;
            }
            if self.next() == Token::RBrace {
                break;
            }
            self.expect(Token::Comma)?;
        }
        self.consumed = true;
        Ok(())
    }

    /// `(params) { body }`. The text from `(` to `}` becomes the function value.
    fn function_literal(&mut self) -> Eval {
        if self.next() != Token::LParen {
            return Err(self.unexpected());
        }
        let start = self.toff;
        self.consumed = true;
        if self.next() != Token::RParen {
            loop {
                self.expect(Token::Identifier)?;
                if self.next() == Token::RParen {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }
        self.consumed = true;
        if self.next() != Token::LBrace {
            return Err(self.unexpected());
        }
        self.suppressed(|ev| ev.block(false))?;
        if self.tok != Token::RBrace {
            return Err(self.unexpected());
        }
        self.consumed = true;
        if !self.exec() {
            return Ok(Value::UNDEFINED);
        }
        let text = self.string_from_code(start, self.pos - start)?;
        Ok(heap_ref(Kind::Func, text))
    }
}
