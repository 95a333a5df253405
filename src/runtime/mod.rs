//! The pocketjs engine instance and its host API.
//!
//! A [`Runtime`] owns nothing but bookkeeping: every object, property and
//! string lives inside the buffer the host hands to [`Runtime::new`].

use std::fmt;

use crate::arena::gc::{GC_DISABLED, Roots};
use crate::arena::{Arena, MAX_MEMORY, MIN_MEMORY, heap_ref};
use crate::diagnostics::{AsStr, CreateError, ErrorKind, ErrorMessage};
use crate::value::{Kind, MAX_CODE_LEN, Value};

/// Raises an error from inside the evaluator and aborts the current code region.
macro_rules! fail {
    ($ev:expr, $kind:ident, $($arg:tt)*) => {
        $ev.error($crate::diagnostics::ErrorKind::$kind, format_args!($($arg)*))
    };
}

mod call;
mod display;
mod eval;
mod ops;

pub use display::Display;
use eval::Evaluator;

/// A host function callable from scripts.
pub type NativeFn = fn(&mut Runtime<'_>, Args) -> Value;

/// Tunables fixed at creation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeConfig {
    /// Fraction of the usable arena above which a statement triggers a collection.
    pub gc_threshold: f64,
    /// Nesting limit for statements and expressions. 0 disables the guard.
    pub max_depth: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig { gc_threshold: 0.75, max_depth: 100 }
    }
}

/// Memory and nesting usage reported by [`Runtime::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub used: usize,
    /// Smallest free gap ever seen between the heap and the argument stack.
    pub low_watermark: usize,
    /// Deepest nesting reached so far.
    pub max_depth: u32,
}

/// Arguments of a native call, still sitting on the argument stack.
#[derive(Debug, Clone, Copy)]
pub struct Args {
    mark: u32,
    len: u32,
}

impl Args {
    #[inline]
    pub fn len(self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.len == 0
    }
}

/// The region of text the evaluator is currently walking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Code {
    /// A slice of the source handed to the innermost `eval`.
    Host { start: u32, len: u32 },
    /// A slice of the text of string entity `entity` (a function body).
    Arena { entity: u32, start: u32, len: u32 },
}

impl Code {
    #[inline]
    pub(crate) fn len(self) -> u32 {
        match self {
            Code::Host { len, .. } | Code::Arena { len, .. } => len,
        }
    }

    /// Sub-region `off..off + len`, relative to this region.
    pub(crate) fn narrow(self, off: u32, len: u32) -> Code {
        match self {
            Code::Host { start, .. } => Code::Host { start: start + off, len },
            Code::Arena { entity, start, .. } => Code::Arena { entity, start: start + off, len },
        }
    }

    fn entity(self) -> Option<u32> {
        match self {
            Code::Arena { entity, .. } => Some(entity),
            Code::Host { .. } => None,
        }
    }

    /// This region, following its entity to wherever `moved` says it lives now.
    pub(crate) fn relocated(self, moved: Code) -> Code {
        match (self, moved.entity()) {
            (Code::Arena { start, len, .. }, Some(entity)) => Code::Arena { entity, start, len },
            _ => self,
        }
    }
}

/// A code region saved by [`Runtime::enter_code`], with its entity rooted on the stack.
pub(crate) struct SavedCode {
    mark: u32,
    code: Code,
}

pub struct Runtime<'mem> {
    pub(crate) arena: Arena<'mem>,
    /// Current scope object.
    pub(crate) scope: u32,
    /// Entity kept alive across the current call (0 = none, `GC_DISABLED` = no collection).
    pub(crate) protected: u32,
    pub(crate) code: Code,
    pub(crate) natives: Vec<NativeFn>,
    pub(crate) error: ErrorMessage,
    pub(crate) gc_threshold: u32,
    pub(crate) max_depth: u32,
    pub(crate) depth: u32,
    pub(crate) peak_depth: u32,
    /// Lines produced by the `print` builtin.
    pub output: Vec<String>,
}

impl<'mem> Runtime<'mem> {
    /// Creates an engine over `mem` with the default configuration.
    pub fn new(mem: &'mem mut [u8]) -> Result<Self, CreateError> {
        Self::with_config(mem, RuntimeConfig::default())
    }

    pub fn with_config(mem: &'mem mut [u8], config: RuntimeConfig) -> Result<Self, CreateError> {
        let actual = mem.len();
        if actual < MIN_MEMORY {
            return Err(CreateError::BufferTooSmall { min: MIN_MEMORY, actual });
        }
        if actual > MAX_MEMORY {
            return Err(CreateError::BufferTooLarge { max: MAX_MEMORY, actual });
        }
        let arena = Arena::new(mem);
        let gc_threshold = (f64::from(arena.limit()) * config.gc_threshold.clamp(0.0, 1.0)) as u32;
        tracing::debug!(
            target: "pocketjs::arena",
            size = arena.limit(),
            gc_threshold,
            "runtime created"
        );
        Ok(Runtime {
            arena,
            scope: 0,
            protected: 0,
            code: Code::Host { start: 0, len: 0 },
            natives: Vec::new(),
            error: ErrorMessage::new(),
            gc_threshold,
            max_depth: config.max_depth,
            depth: 0,
            peak_depth: 0,
            output: Vec::new(),
        })
    }

    /// Evaluates `src` and returns the value of its last statement.
    pub fn eval(&mut self, src: &str) -> Value {
        self.eval_bytes(src.as_bytes())
    }

    /// Evaluates raw source bytes. Safe to call from inside a native function.
    pub fn eval_bytes(&mut self, src: &[u8]) -> Value {
        if src.len() > MAX_CODE_LEN {
            return self.mk_err(
                ErrorKind::Resource,
                format_args!("script too long: {} bytes", src.len()),
            );
        }
        let region = Code::Host { start: 0, len: src.len() as u32 };
        let saved = match self.enter_code(region) {
            Ok(saved) => saved,
            Err(e) => return e,
        };
        tracing::trace!(target: "pocketjs::eval", len = src.len(), depth = self.depth, "eval");
        let res = Evaluator::new(self, src).run();
        self.leave_code(saved);
        self.arena.note_usage();
        res.unwrap_or_else(|e| e)
    }

    /// Switches to `code`, rooting the entity of the region being left.
    pub(crate) fn enter_code(&mut self, code: Code) -> Result<SavedCode, Value> {
        let mark = self.arena.top();
        let root = match self.code.entity() {
            Some(entity) => heap_ref(Kind::Str, entity),
            None => Value::UNDEFINED,
        };
        if !self.arena.push(root) {
            return Err(self.mk_err(ErrorKind::Resource, format_args!("oom")));
        }
        let saved = SavedCode { mark, code: self.code };
        self.code = code;
        Ok(saved)
    }

    pub(crate) fn leave_code(&mut self, saved: SavedCode) {
        let root = self.arena.slot(saved.mark, 0);
        self.code = match saved.code {
            Code::Arena { start, len, .. } => Code::Arena { entity: root.offset(), start, len },
            host => host,
        };
        self.arena.pop_to(saved.mark);
    }

    /// The global scope object.
    #[inline]
    pub fn global(&self) -> Value {
        heap_ref(Kind::Object, 0)
    }

    pub fn mk_str(&mut self, s: &str) -> Value {
        match self.arena.new_string_from(s.as_bytes()) {
            Some(off) => heap_ref(Kind::Str, off),
            None => self.mk_err(ErrorKind::Resource, format_args!("oom")),
        }
    }

    pub fn mk_obj(&mut self) -> Value {
        match self.arena.new_object(0) {
            Some(off) => heap_ref(Kind::Object, off),
            None => self.mk_err(ErrorKind::Resource, format_args!("oom")),
        }
    }

    /// Registers `f` and returns a value that calls it.
    pub fn mk_native(&mut self, f: NativeFn) -> Value {
        self.natives.push(f);
        Value::boxed(Kind::Native, (self.natives.len() - 1) as u64)
    }

    /// Records an error message and returns the error value.
    pub fn mk_err(&mut self, kind: ErrorKind, args: fmt::Arguments<'_>) -> Value {
        self.error.set(kind, args);
        tracing::debug!(
            target: "pocketjs::eval",
            kind = kind.as_str(),
            message = self.error.as_str(),
            "error raised"
        );
        Value::ERR
    }

    /// Adds property `key` to object `obj`.
    pub fn set(&mut self, obj: Value, key: &str, val: Value) -> Result<(), Value> {
        if obj.kind() != Kind::Object {
            return Err(self.mk_err(ErrorKind::Type, format_args!("lookup in non-obj")));
        }
        let Some(key) = self.arena.new_string_from(key.as_bytes()) else {
            return Err(self.mk_err(ErrorKind::Resource, format_args!("oom")));
        };
        match self.arena.set_prop(obj.offset(), key, val) {
            Some(_) => Ok(()),
            None => Err(self.mk_err(ErrorKind::Resource, format_args!("oom"))),
        }
    }

    /// Own property `key` of `obj`.
    pub fn get(&self, obj: Value, key: &str) -> Option<Value> {
        if obj.kind() != Kind::Object {
            return None;
        }
        match self.arena.find_prop(obj.offset(), key.as_bytes()) {
            0 => None,
            prop => Some(self.arena.prop_value(prop)),
        }
    }

    /// Text of a string value, or of a function's captured source.
    pub fn str_bytes(&self, v: Value) -> Option<&[u8]> {
        match v.kind() {
            Kind::Str | Kind::Func => Some(self.arena.str_bytes(v.offset())),
            _ => None,
        }
    }

    pub fn as_str(&self, v: Value) -> Option<&str> {
        if v.kind() != Kind::Str {
            return None;
        }
        std::str::from_utf8(self.arena.str_bytes(v.offset())).ok()
    }

    /// Wraps `v` for printing with `{}`.
    pub fn display(&self, v: Value) -> Display<'_, 'mem> {
        Display { rt: self, value: v }
    }

    pub fn error_message(&self) -> &str {
        self.error.as_str()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.kind()
    }

    pub fn type_name(&self, v: Value) -> &'static str {
        v.kind().type_name()
    }

    /// The `i`-th argument of a native call, `undefined` past the end.
    pub fn arg(&self, args: Args, i: usize) -> Value {
        if i < args.len() { self.arena.slot(args.mark, i as u32) } else { Value::UNDEFINED }
    }

    /// Iterates the arguments of a native call.
    pub fn args(&self, args: Args) -> impl Iterator<Item = Value> + '_ {
        (0..args.len()).map(move |i| self.arg(args, i))
    }

    /// Checks argument kinds against `kinds`, one letter per argument:
    /// `b` boolean, `d` number, `s` string, `j` anything. The count must match.
    pub fn check_args(&self, args: Args, kinds: &str) -> bool {
        kinds.len() == args.len()
            && kinds.bytes().enumerate().all(|(i, c)| {
                let kind = self.arg(args, i).kind();
                match c {
                    b'b' => kind == Kind::Bool,
                    b'd' => kind == Kind::Number,
                    b's' => kind == Kind::Str,
                    b'j' => true,
                    _ => false,
                }
            })
    }

    /// Heap usage in bytes above which statements trigger a collection.
    pub fn set_gc_threshold(&mut self, bytes: usize) {
        self.gc_threshold = bytes.min(self.arena.limit() as usize) as u32;
    }

    pub fn set_max_depth(&mut self, depth: u32) {
        self.max_depth = depth;
    }

    /// Runs one collection pass now. Returns the number of bytes reclaimed.
    pub fn gc(&mut self) -> usize {
        let code = match &mut self.code {
            Code::Arena { entity, .. } => Some(entity),
            Code::Host { .. } => None,
        };
        let roots = Roots { scope: &mut self.scope, protected: &mut self.protected, code };
        self.arena.collect(roots) as usize
    }

    /// Runs `f` with collection switched off.
    pub fn with_gc_disabled<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let protected = std::mem::replace(&mut self.protected, GC_DISABLED);
        let res = f(self);
        self.protected = protected;
        res
    }

    pub fn stats(&self) -> Stats {
        Stats {
            total: self.arena.limit() as usize,
            used: self.arena.brk() as usize,
            low_watermark: self.arena.low_watermark() as usize,
            max_depth: self.peak_depth,
        }
    }

    /// Listing of every entity and stack slot, for debugging.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.arena.dump(&mut out);
        out
    }
}

impl fmt::Debug for Runtime<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("stats", &self.stats())
            .field("scope", &self.scope)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
