use std::fmt::{self, Write};

use crate::helper;
use crate::runtime::Runtime;
use crate::value::{Kind, Value};

/// Objects nested deeper than this print as `{...}`.
const MAX_NESTING: usize = 32;
/// Objects printed after this many print as `{...}`, so shared children
/// cannot multiply the output.
const MAX_OBJECTS: usize = 4096;

/// A value paired with the runtime that owns its entities.
pub struct Display<'a, 'mem> {
    pub(super) rt: &'a Runtime<'mem>,
    pub(super) value: Value,
}

impl fmt::Display for Display<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut budget = MAX_OBJECTS;
        write_value(self.rt, f, self.value, None, &mut budget)
    }
}

/// The objects enclosing the one being printed, innermost first.
struct Path<'p> {
    obj: u32,
    depth: usize,
    outer: Option<&'p Path<'p>>,
}

impl Path<'_> {
    fn contains(&self, obj: u32) -> bool {
        let mut p = Some(self);
        while let Some(node) = p {
            if node.obj == obj {
                return true;
            }
            p = node.outer;
        }
        false
    }
}

fn write_value(
    rt: &Runtime<'_>,
    f: &mut fmt::Formatter<'_>,
    v: Value,
    path: Option<&Path<'_>>,
    budget: &mut usize,
) -> fmt::Result {
    match v.kind() {
        Kind::Undefined => f.write_str("undefined"),
        Kind::Null => f.write_str("null"),
        Kind::Bool => f.write_str(if v.payload() != 0 { "true" } else { "false" }),
        Kind::Number => helper::write_number(f, v.to_f64()),
        Kind::Str => {
            f.write_char('"')?;
            write_lossy(f, rt.arena.str_bytes(v.offset()))?;
            f.write_char('"')
        }
        Kind::Func => {
            f.write_str("function")?;
            write_lossy(f, rt.arena.str_bytes(v.offset()))
        }
        Kind::Native => write!(f, "\"native_fn_{}\"", v.offset()),
        Kind::Object => {
            let obj = v.offset();
            let depth = path.map_or(0, |p| p.depth + 1);
            if depth >= MAX_NESTING || *budget == 0 || path.is_some_and(|p| p.contains(obj)) {
                return f.write_str("{...}");
            }
            *budget -= 1;
            let here = Path { obj, depth, outer: path };
            f.write_char('{')?;
            let mut prop = rt.arena.first_prop(obj);
            while prop != 0 {
                f.write_char('"')?;
                write_lossy(f, rt.arena.str_bytes(rt.arena.prop_key(prop)))?;
                f.write_str("\":")?;
                write_value(rt, f, rt.arena.prop_value(prop), Some(&here), budget)?;
                prop = rt.arena.next_prop(prop);
                if prop != 0 {
                    f.write_char(',')?;
                }
            }
            f.write_char('}')
        }
        Kind::Prop => write!(f, "PROP@{}", v.offset()),
        Kind::CodeRef => {
            let (off, len) = v.code_ref_parts();
            write!(f, "CODEREF@{off}:{len}")
        }
        Kind::Err => write!(f, "ERROR: {}", rt.error),
    }
}

fn write_lossy(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for chunk in bytes.utf8_chunks() {
        f.write_str(chunk.valid())?;
        if !chunk.invalid().is_empty() {
            f.write_char(char::REPLACEMENT_CHARACTER)?;
        }
    }
    Ok(())
}
