#![allow(
    clippy::many_single_char_names,
    clippy::similar_names,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::too_many_lines,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]

pub mod arena;
pub mod builtins;
pub mod diagnostics;
pub mod helper;
pub mod runtime;
pub mod syntax;
pub mod value;
#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use diagnostics::{CreateError, ErrorKind};
pub use runtime::{Args, NativeFn, Runtime, RuntimeConfig, Stats};
pub use value::{Kind, Value};
