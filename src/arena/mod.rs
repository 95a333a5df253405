//! The offset-addressed arena. One caller-owned buffer, no growth.
//!
//! The heap grows up from offset 0 and holds self-describing entities; the
//! argument stack grows down from the top. Both share the free space between
//! `brk` and `top`.
//!
//! ```text
//! 0                brk                  top              limit
//! | entities ...    |   free space ...   | argument stack  |
//! ```

pub mod gc;

use crate::value::{Kind, Value};

/// Low two bits of every header word.
pub const OBJECT: u32 = 0;
pub const PROP: u32 = 1;
pub const STRING: u32 = 2;

pub const OBJECT_SIZE: u32 = 8;
pub const PROP_SIZE: u32 = 16;
pub const SLOT_SIZE: u32 = 8;

pub(crate) const GC_MARK: u32 = 0x8000_0000;
const TAG_MASK: u32 = 3;

/// Smallest buffer an engine can be created over.
pub const MIN_MEMORY: usize = 64;
/// Offsets share their word with the GC mark bit.
pub const MAX_MEMORY: usize = GC_MARK as usize;

#[inline]
const fn align4(n: u32) -> u32 {
    (n + 3) & !3
}

/// Size in bytes of the entity whose (unmarked) header word is `word`.
#[inline]
pub(crate) fn entity_size(word: u32) -> u32 {
    match word & TAG_MASK {
        OBJECT => OBJECT_SIZE,
        PROP => PROP_SIZE,
        _ => 4 + align4(word >> 2),
    }
}

pub struct Arena<'mem> {
    mem: &'mem mut [u8],
    brk: u32,
    top: u32,
    limit: u32,
    low_watermark: u32,
}

impl<'mem> Arena<'mem> {
    /// Takes over `mem` (rounded down to 8 bytes) and places the root object at 0.
    /// The caller has already checked the size bounds.
    pub(crate) fn new(mem: &'mem mut [u8]) -> Self {
        let limit = (mem.len() & !7) as u32;
        mem.fill(0);
        let mut arena = Arena { mem, brk: 0, top: limit, limit, low_watermark: limit };
        // header and parent of the root object are both zero already
        arena.brk = OBJECT_SIZE;
        arena.note_usage();
        arena
    }

    #[inline]
    pub fn brk(&self) -> u32 {
        self.brk
    }

    #[inline]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Lowest boundary of the argument stack.
    #[inline]
    pub fn top(&self) -> u32 {
        self.top
    }

    #[inline]
    pub fn free(&self) -> u32 {
        self.top - self.brk
    }

    pub fn low_watermark(&self) -> u32 {
        self.low_watermark
    }

    pub(crate) fn note_usage(&mut self) {
        self.low_watermark = self.low_watermark.min(self.free());
    }

    #[inline]
    pub(crate) fn word(&self, off: u32) -> u32 {
        let o = off as usize;
        u32::from_ne_bytes([self.mem[o], self.mem[o + 1], self.mem[o + 2], self.mem[o + 3]])
    }

    #[inline]
    pub(crate) fn set_word(&mut self, off: u32, w: u32) {
        let o = off as usize;
        self.mem[o..o + 4].copy_from_slice(&w.to_ne_bytes());
    }

    #[inline]
    pub(crate) fn value(&self, off: u32) -> Value {
        let o = off as usize;
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.mem[o..o + 8]);
        Value::from_bits(u64::from_ne_bytes(b))
    }

    #[inline]
    pub(crate) fn set_value(&mut self, off: u32, v: Value) {
        let o = off as usize;
        self.mem[o..o + 8].copy_from_slice(&v.to_bits().to_ne_bytes());
    }

    #[inline]
    pub(crate) fn bytes(&self, off: u32, len: u32) -> &[u8] {
        &self.mem[off as usize..(off + len) as usize]
    }

    /// Bump-allocates `size` bytes (rounded up to 4). Fails when the request
    /// would reach the argument stack.
    pub(crate) fn alloc(&mut self, size: u32) -> Option<u32> {
        let size = align4(size);
        let off = self.brk;
        if size > self.free() {
            tracing::debug!(
                target: "pocketjs::arena",
                size,
                brk = self.brk,
                top = self.top,
                "out of memory"
            );
            return None;
        }
        self.brk += size;
        self.note_usage();
        Some(off)
    }

    pub(crate) fn new_object(&mut self, parent: u32) -> Option<u32> {
        let off = self.alloc(OBJECT_SIZE)?;
        self.set_word(off, OBJECT);
        self.set_word(off + 4, parent);
        Some(off)
    }

    /// Allocates a string entity of `len` bytes, NUL-terminated, contents zeroed.
    pub(crate) fn new_string(&mut self, len: u32) -> Option<u32> {
        let n = len.checked_add(1).filter(|n| *n < 1 << 30)?;
        let off = self.alloc(4 + n)?;
        self.set_word(off, (n << 2) | STRING);
        self.mem[(off + 4) as usize..(off + 4 + align4(n)) as usize].fill(0);
        Some(off)
    }

    pub(crate) fn new_string_from(&mut self, bytes: &[u8]) -> Option<u32> {
        let off = self.new_string(u32::try_from(bytes.len()).ok()?)?;
        let data = (off + 4) as usize;
        self.mem[data..data + bytes.len()].copy_from_slice(bytes);
        Some(off)
    }

    /// Copies `len` bytes already living in the arena at `src` into a new string.
    pub(crate) fn new_string_within(&mut self, src: u32, len: u32) -> Option<u32> {
        let off = self.new_string(len)?;
        self.mem.copy_within(src as usize..(src + len) as usize, (off + 4) as usize);
        Some(off)
    }

    #[inline]
    pub(crate) fn str_len(&self, off: u32) -> u32 {
        (self.word(off) >> 2) - 1
    }

    #[inline]
    pub(crate) fn str_bytes(&self, off: u32) -> &[u8] {
        self.bytes(off + 4, self.str_len(off))
    }

    pub(crate) fn str_byte_mut(&mut self, off: u32, i: u32) -> &mut u8 {
        &mut self.mem[(off + 4 + i) as usize]
    }

    /// Copies the text of string `src` into string `dst` starting at byte `at`.
    pub(crate) fn copy_str_into(&mut self, src: u32, dst: u32, at: u32) {
        let len = self.str_len(src);
        let from = (src + 4) as usize;
        self.mem.copy_within(from..from + len as usize, (dst + 4 + at) as usize);
    }

    #[inline]
    pub(crate) fn first_prop(&self, obj: u32) -> u32 {
        self.word(obj) & !(TAG_MASK | GC_MARK)
    }

    #[inline]
    pub(crate) fn next_prop(&self, prop: u32) -> u32 {
        self.word(prop) & !(TAG_MASK | GC_MARK)
    }

    #[inline]
    pub(crate) fn parent(&self, obj: u32) -> u32 {
        self.word(obj + 4)
    }

    #[inline]
    pub(crate) fn prop_key(&self, prop: u32) -> u32 {
        self.word(prop + 4)
    }

    #[inline]
    pub(crate) fn prop_value(&self, prop: u32) -> Value {
        self.value(prop + 8)
    }

    #[inline]
    pub(crate) fn set_prop_value(&mut self, prop: u32, v: Value) {
        self.set_value(prop + 8, v);
    }

    /// Prepends a property to `obj`'s list.
    pub(crate) fn set_prop(&mut self, obj: u32, key: u32, v: Value) -> Option<u32> {
        let head = self.first_prop(obj);
        let prop = self.alloc(PROP_SIZE)?;
        self.set_word(prop, head | PROP);
        self.set_word(prop + 4, key);
        self.set_value(prop + 8, v);
        let mark = self.word(obj) & GC_MARK;
        self.set_word(obj, prop | OBJECT | mark);
        Some(prop)
    }

    /// Offset of `obj`'s own property called `name`, or 0.
    pub(crate) fn find_prop(&self, obj: u32, name: &[u8]) -> u32 {
        let mut prop = self.first_prop(obj);
        while prop != 0 {
            if self.str_bytes(self.prop_key(prop)) == name {
                return prop;
            }
            prop = self.next_prop(prop);
        }
        0
    }

    /// Pushes one slot onto the argument stack.
    pub(crate) fn push(&mut self, v: Value) -> bool {
        if self.free() < SLOT_SIZE {
            tracing::debug!(
                target: "pocketjs::arena",
                brk = self.brk,
                top = self.top,
                "argument stack overflow"
            );
            return false;
        }
        self.top -= SLOT_SIZE;
        self.set_value(self.top, v);
        self.note_usage();
        true
    }

    /// Pops the argument stack back to `mark`, a value previously read from [`Arena::top`].
    pub(crate) fn pop_to(&mut self, mark: u32) {
        debug_assert!(mark >= self.top && mark <= self.limit, "argument stack underflow");
        self.top = mark.clamp(self.top, self.limit);
    }

    /// The `i`-th slot pushed after the stack top was `mark`.
    #[inline]
    pub(crate) fn slot(&self, mark: u32, i: u32) -> Value {
        self.value(mark - SLOT_SIZE * (i + 1))
    }

    /// Values currently on the argument stack, innermost first.
    pub(crate) fn stack_slots(&self) -> impl Iterator<Item = u32> + use<> {
        (self.top..self.limit).step_by(SLOT_SIZE as usize)
    }

    /// Debug listing of every entity between 0 and `brk`.
    pub(crate) fn dump(&self, out: &mut String) {
        use std::fmt::Write;

        let _ = writeln!(out, "brk {}, top {}, limit {}", self.brk, self.top, self.limit);
        let mut off = 0;
        while off < self.brk {
            let w = self.word(off);
            let size = entity_size(w & !GC_MARK);
            let _ = match w & TAG_MASK {
                OBJECT => writeln!(
                    out,
                    "{off:5} OBJ {} {}",
                    self.first_prop(off),
                    self.parent(off)
                ),
                PROP => writeln!(
                    out,
                    "{off:5} PROP next {} key {} val {:?}",
                    self.next_prop(off),
                    self.prop_key(off),
                    self.prop_value(off)
                ),
                _ => writeln!(
                    out,
                    "{off:5} STR {:?}",
                    String::from_utf8_lossy(self.str_bytes(off))
                ),
            };
            off += size;
        }
        for slot in self.stack_slots() {
            let _ = writeln!(out, "{slot:5} SLOT {:?}", self.value(slot));
        }
    }
}

/// True if `v` keeps an arena entity alive.
#[inline]
pub(crate) fn references_heap(v: Value) -> bool {
    v.kind().is_heap()
}

/// Builds a heap reference of `kind` to `off`.
#[inline]
pub(crate) fn heap_ref(kind: Kind, off: u32) -> Value {
    Value::boxed(kind, off as u64)
}
