#![allow(dead_code)]

use pocketjs::builtins;
use pocketjs::diagnostics::ErrorKind;
use pocketjs::runtime::{Runtime, RuntimeConfig};

/// What a script left behind.
#[derive(Debug)]
pub struct Outcome {
    pub output: Vec<String>,
    /// Display form of the final value.
    pub value: String,
    pub error: Option<(ErrorKind, String)>,
}

pub fn run(src: &str) -> Outcome {
    run_with(src, 8192, RuntimeConfig::default())
}

pub fn run_with(src: &str, memory: usize, config: RuntimeConfig) -> Outcome {
    let mut mem = vec![0u8; memory];
    let mut rt = Runtime::with_config(&mut mem, config).expect("buffer size is valid");
    builtins::install(&mut rt).expect("builtins fit in memory");
    let res = rt.eval(src);
    let error = res
        .is_err()
        .then(|| (rt.error_kind().expect("error kind set"), rt.error_message().to_owned()));
    Outcome { value: rt.display(res).to_string(), output: std::mem::take(&mut rt.output), error }
}
