use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use lox::{run_file, run_with, Interpreter, Reporter, Source};

const EX_USAGE: u8 = 64;
const EX_DATAERR: u8 = 65;
const EX_SOFTWARE: u8 = 70;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [] => {
            run_prompt();
            ExitCode::SUCCESS
        }
        [path] => run_script(&PathBuf::from(path)),
        _ => {
            eprintln!("Usage: lox [script]");
            ExitCode::from(EX_USAGE)
        }
    }
}

fn run_script(path: &PathBuf) -> ExitCode {
    let mut reporter = Reporter::new(io::stdout());
    match run_file(path, &mut reporter) {
        Ok(()) => {
            if reporter.had_error() {
                ExitCode::from(EX_DATAERR)
            } else if reporter.had_runtime_error() {
                ExitCode::from(EX_SOFTWARE)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(error) => {
            eprintln!("Could not read '{}': {}", path.display(), error);
            ExitCode::from(EX_DATAERR)
        }
    }
}

/// A line-at-a-time REPL: each line runs as if it were a whole program
/// (scanned, parsed, and resolved fresh), but all lines share the same
/// interpreter so that a `var` or `fun` declared on one line is still
/// visible on the next.
fn run_prompt() {
    let mut reporter = Reporter::new(io::stdout());
    let mut interpreter = Interpreter::new();
    let stdin = io::stdin();

    loop {
        print!("[lox]> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(_) => break,
        }

        let line = line.trim_end_matches(['\n', '\r']);
        if line == "exit" {
            break;
        }

        run_with(&mut interpreter, Source::line(line), &mut reporter);
        reporter.reset();
    }
}
