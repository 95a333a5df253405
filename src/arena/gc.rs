//! Mark / unmark / compact collector.
//!
//! A pass flags every entity, clears the flag on everything reachable from the
//! roots, then slides the survivors down over each flagged entity, fixing every
//! stored offset as it goes.

use super::{Arena, GC_MARK, OBJECT, PROP, TAG_MASK, entity_size, references_heap};
use crate::value::Value;

/// Protected-entity sentinel that disables collection entirely.
pub const GC_DISABLED: u32 = u32::MAX;

/// Engine state that points into the heap.
pub struct Roots<'a> {
    pub scope: &'a mut u32,
    /// 0 when nothing is protected.
    pub protected: &'a mut u32,
    /// String entity holding the code being evaluated, if any.
    pub code: Option<&'a mut u32>,
}

/// Stack of entities whose children still need visiting. It lives in the
/// free gap between the heap and the argument stack, which marking never uses.
struct Pending {
    start: u32,
    len: u32,
    cap: u32,
    overflowed: bool,
}

impl Pending {
    fn new(brk: u32, top: u32) -> Self {
        Pending { start: brk, len: 0, cap: (top - brk) / 4, overflowed: false }
    }
}

impl Arena<'_> {
    /// Runs one collection pass and returns the number of bytes reclaimed.
    pub fn collect(&mut self, roots: Roots<'_>) -> u32 {
        if *roots.protected == GC_DISABLED {
            return 0;
        }
        let before = self.brk;
        self.mark_all();
        self.unmark_roots(&roots);
        self.compact(roots);
        let reclaimed = before - self.brk;
        tracing::debug!(
            target: "pocketjs::gc",
            before,
            after = self.brk,
            reclaimed,
            "collection pass"
        );
        reclaimed
    }

    fn mark_all(&mut self) {
        let mut off = 0;
        while off < self.brk {
            let w = self.word(off);
            self.set_word(off, w | GC_MARK);
            off += entity_size(w & !GC_MARK);
        }
    }

    fn unmark_roots(&mut self, roots: &Roots<'_>) {
        let mut work = Pending::new(self.brk, self.top);
        let mut scope = *roots.scope;
        loop {
            self.reach(&mut work, scope);
            if scope == 0 {
                break;
            }
            scope = self.parent(scope);
        }
        if *roots.protected != 0 {
            self.reach(&mut work, *roots.protected);
        }
        if let Some(code) = &roots.code {
            self.reach(&mut work, **code);
        }
        for slot in self.stack_slots() {
            let v = self.value(slot);
            if references_heap(v) {
                self.reach(&mut work, v.offset());
            }
        }
        self.drain(&mut work);
        while work.overflowed {
            work.overflowed = false;
            self.rescan(&mut work);
            self.drain(&mut work);
        }
    }

    /// Clears the mark on the entity at `off`. Objects and properties are
    /// queued so their children get visited.
    fn reach(&mut self, work: &mut Pending, off: u32) {
        let w = self.word(off);
        if w & GC_MARK == 0 {
            return;
        }
        self.set_word(off, w & !GC_MARK);
        if !matches!(w & TAG_MASK, OBJECT | PROP) {
            return;
        }
        if work.len < work.cap {
            self.set_word(work.start + 4 * work.len, off);
            work.len += 1;
        } else {
            work.overflowed = true;
        }
    }

    fn drain(&mut self, work: &mut Pending) {
        while work.len > 0 {
            work.len -= 1;
            let off = self.word(work.start + 4 * work.len);
            self.reach_children(work, off);
        }
    }

    fn reach_children(&mut self, work: &mut Pending, off: u32) {
        match self.word(off) & TAG_MASK {
            OBJECT => {
                let prop = self.first_prop(off);
                if prop != 0 {
                    self.reach(work, prop);
                }
            }
            PROP => {
                let next = self.next_prop(off);
                if next != 0 {
                    self.reach(work, next);
                }
                self.reach(work, self.prop_key(off));
                let v = self.prop_value(off);
                if references_heap(v) {
                    self.reach(work, v.offset());
                }
            }
            _ => {}
        }
    }

    /// Visits the children of every unmarked entity. Used once the worklist
    /// has overflowed and some unmarked entities were never queued.
    fn rescan(&mut self, work: &mut Pending) {
        let mut off = 0;
        while off < self.brk {
            let w = self.word(off);
            if w & GC_MARK == 0 {
                self.reach_children(work, off);
            }
            off += entity_size(w & !GC_MARK);
        }
    }

    fn compact(&mut self, mut roots: Roots<'_>) {
        let mut off = 0;
        while off < self.brk {
            let w = self.word(off);
            let size = entity_size(w & !GC_MARK);
            if w & GC_MARK == 0 {
                off += size;
                continue;
            }
            self.fix_up(off, size, &mut roots);
            let (start, end) = ((off + size) as usize, self.brk as usize);
            self.mem.copy_within(start..end, off as usize);
            self.brk -= size;
        }
    }

    /// Shifts every offset that points past `start` down by `size`.
    fn fix_up(&mut self, start: u32, size: u32, roots: &mut Roots<'_>) {
        let shift = |v: u32| if v > start { v - size } else { v };
        let mut off = 0;
        while off < self.brk {
            let w = self.word(off);
            let n = entity_size(w & !GC_MARK);
            if w & GC_MARK == 0 {
                match w & TAG_MASK {
                    OBJECT => {
                        self.set_word(off, shift(w & !TAG_MASK) | OBJECT);
                        let parent = self.parent(off);
                        self.set_word(off + 4, shift(parent));
                    }
                    PROP => {
                        self.set_word(off, shift(w & !TAG_MASK) | PROP);
                        let key = self.prop_key(off);
                        self.set_word(off + 4, shift(key));
                        let v = self.prop_value(off);
                        self.set_prop_value(off, shift_value(v, start, size));
                    }
                    _ => {}
                }
            }
            off += n;
        }
        *roots.scope = shift(*roots.scope);
        if *roots.protected != 0 {
            *roots.protected = shift(*roots.protected);
        }
        if let Some(code) = roots.code.as_deref_mut() {
            *code = shift(*code);
        }
        for slot in self.stack_slots() {
            let v = self.value(slot);
            self.set_value(slot, shift_value(v, start, size));
        }
    }
}

fn shift_value(v: Value, start: u32, size: u32) -> Value {
    if references_heap(v) && v.offset() > start {
        Value::boxed(v.kind(), (v.offset() - size) as u64)
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{OBJECT_SIZE, PROP_SIZE, heap_ref};
    use crate::value::Kind;

    fn roots<'a>(scope: &'a mut u32, protected: &'a mut u32) -> Roots<'a> {
        Roots { scope, protected, code: None }
    }

    #[test]
    fn unreachable_entities_are_reclaimed() {
        let mut mem = [0u8; 512];
        let mut arena = Arena::new(&mut mem);
        let junk = arena.new_string_from(b"garbage").unwrap();
        let key = arena.new_string_from(b"k").unwrap();
        let val = arena.new_string_from(b"kept").unwrap();
        arena.set_prop(0, key, Value::boxed(Kind::Str, val as u64)).unwrap();
        let before = arena.brk();

        let (mut scope, mut protected) = (0, 0);
        let reclaimed = arena.collect(roots(&mut scope, &mut protected));

        // only "garbage" goes: 4 byte header + 8 bytes of text
        assert_eq!(reclaimed, 12);
        assert_eq!(arena.brk(), before - reclaimed);
        assert_eq!(arena.word(junk) & TAG_MASK, crate::arena::STRING);
        let prop = arena.find_prop(0, b"k");
        assert_ne!(prop, 0);
        let v = arena.prop_value(prop);
        assert_eq!(v.kind(), Kind::Str);
        assert_eq!(arena.str_bytes(v.offset()), b"kept");
    }

    #[test]
    fn scope_chain_and_protected_survive_and_move() {
        let mut mem = [0u8; 512];
        let mut arena = Arena::new(&mut mem);
        let _junk = arena.new_object(0).unwrap();
        let mut scope = arena.new_object(0).unwrap();
        let key = arena.new_string_from(b"x").unwrap();
        arena.set_prop(scope, key, Value::number(3.0)).unwrap();
        let mut protected = arena.new_string_from(b"(a) { return a; }").unwrap();
        let mut code = protected;

        let reclaimed = arena.collect(Roots {
            scope: &mut scope,
            protected: &mut protected,
            code: Some(&mut code),
        });

        assert_eq!(reclaimed, 8);
        assert_eq!(scope, 8);
        assert_eq!(code, protected);
        assert_eq!(arena.str_bytes(protected), b"(a) { return a; }");
        let prop = arena.find_prop(scope, b"x");
        assert_eq!(arena.prop_value(prop).as_number(), Some(3.0));
    }

    #[test]
    fn stack_slots_are_roots() {
        let mut mem = [0u8; 256];
        let mut arena = Arena::new(&mut mem);
        let _junk = arena.new_string_from(b"junk").unwrap();
        let temp = arena.new_string_from(b"temp").unwrap();
        let mark = arena.top();
        arena.push(Value::boxed(Kind::Str, temp as u64));

        let (mut scope, mut protected) = (0, 0);
        arena.collect(roots(&mut scope, &mut protected));

        let moved = arena.slot(mark, 0);
        assert_eq!(moved.offset(), 8);
        assert_eq!(arena.str_bytes(moved.offset()), b"temp");
    }

    #[test]
    fn disabled_collector_is_a_no_op() {
        let mut mem = [0u8; 128];
        let mut arena = Arena::new(&mut mem);
        arena.new_string_from(b"junk").unwrap();
        let brk = arena.brk();
        let (mut scope, mut protected) = (0, GC_DISABLED);
        assert_eq!(arena.collect(roots(&mut scope, &mut protected)), 0);
        assert_eq!(arena.brk(), brk);
    }

    #[test]
    fn long_chain_survives_with_no_room_for_the_worklist() {
        let mut mem = [0u8; 4096];
        let mut arena = Arena::new(&mut mem);
        arena.new_string_from(b"garbage").unwrap();
        let key = arena.new_string_from(b"n").unwrap();
        let mut head = Value::NULL;
        let mut links = 0;
        while arena.free() >= OBJECT_SIZE + PROP_SIZE {
            let obj = arena.new_object(0).unwrap();
            arena.set_prop(obj, key, head).unwrap();
            head = heap_ref(Kind::Object, obj);
            links += 1;
        }
        // garbage filler takes the rest so the worklist has no capacity at all
        let rest = arena.free();
        arena.new_string(rest - 5).unwrap();
        assert_eq!(arena.free(), 0);

        let (mut scope, mut protected) = (0, head.offset());
        let reclaimed = arena.collect(roots(&mut scope, &mut protected));

        assert_eq!(reclaimed, 12 + rest);
        let mut v = heap_ref(Kind::Object, protected);
        let mut seen = 0;
        while v.kind() == Kind::Object {
            let prop = arena.find_prop(v.offset(), b"n");
            v = arena.prop_value(prop);
            seen += 1;
        }
        assert_eq!(seen, links);
        assert_eq!(v, Value::NULL);
    }
}
