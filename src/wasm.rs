use wasm_bindgen::prelude::*;

use crate::builtins;
use crate::helper::KIBI;
use crate::runtime::Runtime;

const MEMORY: usize = 64 * KIBI;

/// Runs `src` in a fresh engine and returns its printed output followed by the
/// final value, HTML-escaped for the playground.
#[wasm_bindgen]
pub fn run_source(src: &str) -> String {
    let mut mem = vec![0u8; MEMORY];
    let mut rt = match Runtime::new(&mut mem) {
        Ok(rt) => rt,
        Err(err) => return html_escape::encode_text(&err.to_string()).into_owned(),
    };
    if builtins::install(&mut rt).is_err() {
        return html_escape::encode_text(&format!("error: {}", rt.error_message())).into_owned();
    }
    let res = rt.eval(src);
    let mut out = rt.output.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    if res.is_err() {
        out.push_str(&format!("error: {}", rt.error_message()));
    } else {
        out.push_str(&rt.display(res).to_string());
    }
    html_escape::encode_text(&out).into_owned()
}
