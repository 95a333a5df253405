use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap_cargo::style::CLAP_STYLING;
use pocketjs::builtins;
use pocketjs::helper::KIBI;
use pocketjs::runtime::{Runtime, RuntimeConfig};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::print_error;

#[derive(Debug, clap::Parser)]
#[command(
    about = "A tiny JavaScript interpreter that lives in a fixed buffer",
    version,
    styles = CLAP_STYLING
)]
pub struct Cli {
    /// Script to run, `-` for stdin
    script: Option<String>,
    /// Evaluate code from the command line
    #[arg(short, long, conflicts_with = "script")]
    eval: Option<String>,
    /// Start a REPL that keeps one engine across lines
    #[arg(short, long)]
    interactive: bool,
    /// Size of the engine's memory buffer in bytes
    #[arg(short, long, default_value_t = 64 * KIBI, value_name = "BYTES")]
    memory: usize,
    /// Heap fill ratio that triggers a collection
    #[arg(long, default_value_t = 0.75, value_name = "FRACTION")]
    gc_threshold: f64,
    /// Nesting limit for statements and expressions, 0 to disable
    #[arg(long, default_value_t = 100)]
    max_depth: u32,
    /// Print memory usage after running
    #[arg(long)]
    stats: bool,
    /// Print the heap layout after running
    #[arg(long)]
    dump: bool,
}

impl Cli {
    pub fn run(self) -> ExitCode {
        let mut mem = vec![0u8; self.memory];
        let config = RuntimeConfig { gc_threshold: self.gc_threshold, max_depth: self.max_depth };
        let mut rt = match Runtime::with_config(&mut mem, config) {
            Ok(rt) => rt,
            Err(err) => {
                print_error!("{err}");
                return ExitCode::FAILURE;
            }
        };
        if builtins::install(&mut rt).is_err() {
            print_error!("failed to install builtins: {}", rt.error_message());
            return ExitCode::FAILURE;
        }

        let code = if let Some(code) = &self.eval {
            run_source(&mut rt, code)
        } else if let Some(script) = &self.script {
            if script == "-" { run_stdin(&mut rt) } else { run_file(&mut rt, script) }
        } else if self.interactive || io::stdin().is_terminal() {
            run_repl(&mut rt)
        } else {
            run_stdin(&mut rt)
        };

        if self.stats {
            let s = rt.stats();
            eprintln!(
                "total {} used {} lwm {} depth {}",
                s.total, s.used, s.low_watermark, s.max_depth
            );
        }
        if self.dump {
            eprint!("{}", rt.dump());
        }
        code
    }
}

/// Evaluates `src`, prints collected output and the result.
fn run_source(rt: &mut Runtime<'_>, src: &str) -> ExitCode {
    let res = rt.eval(src);
    for line in rt.output.drain(..) {
        println!("{line}");
    }
    if res.is_err() {
        print_error!("{}", rt.error_message());
        return ExitCode::FAILURE;
    }
    println!("{}", rt.display(res));
    ExitCode::SUCCESS
}

fn run_file(rt: &mut Runtime<'_>, path: &str) -> ExitCode {
    match fs::read_to_string(path) {
        Ok(src) => run_source(rt, &src),
        Err(err) => {
            print_error!("Failed to read file '{path}': {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_stdin(rt: &mut Runtime<'_>) -> ExitCode {
    let mut src = String::new();
    if let Err(err) = io::stdin().read_to_string(&mut src) {
        print_error!("Failed to read from stdin: {err}");
        return ExitCode::FAILURE;
    }
    run_source(rt, &src)
}

fn history_path() -> Option<PathBuf> {
    let dir = dirs::data_local_dir()?.join("pocketjs");
    fs::create_dir_all(&dir).ok()?;
    Some(dir.join("history"))
}

/// Starts the interactive Read-Eval-Print Loop (REPL).
fn run_repl(rt: &mut Runtime<'_>) -> ExitCode {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            print_error!("Failed to start REPL: {err}");
            return ExitCode::FAILURE;
        }
    };
    let history = history_path();
    if let Some(path) = &history {
        let _ = editor.load_history(path);
    }
    println!("pocketjs REPL (type 'exit' or Ctrl+D to quit)");
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line == "exit" {
                    break;
                }
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                run_source(rt, line);
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                print_error!("{err}");
                break;
            }
        }
    }
    if let Some(path) = &history {
        let _ = editor.save_history(path);
    }
    ExitCode::SUCCESS
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}
