//! Command-line entry point.
//!
//! `skua <file> [run|parse|compile]` — runs a script (default), checks its
//! syntax, or prints the compiled bytecode. Exit code 0 on success,
//! non-zero with a diagnostic on standard error on parse or runtime
//! failure.

use std::process::ExitCode;

use skua::{Object, Runner, StderrTracer};

const USAGE: &str = "usage: skua <file> [run|parse|compile] [--trace]";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut path = None;
    let mut command = "run";
    let mut trace = false;
    for arg in &args {
        match arg.as_str() {
            "run" | "parse" | "compile" => command = arg,
            "--trace" => trace = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            _ if path.is_none() => path = Some(arg.clone()),
            _ => {
                eprintln!("{USAGE}");
                return ExitCode::FAILURE;
            }
        }
    }
    let Some(path) = path else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    let source = match std::fs::read_to_string(&path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("skua: cannot read {path}: {error}");
            return ExitCode::FAILURE;
        }
    };

    match command {
        "parse" => match skua::parser::parse(&source, &path) {
            Ok(_) => ExitCode::SUCCESS,
            Err(error) => {
                eprintln!("{error}");
                ExitCode::FAILURE
            }
        },
        "compile" => match Runner::new(&source, &path) {
            Ok(runner) => {
                print!("{}", runner.disassemble());
                ExitCode::SUCCESS
            }
            Err(error) => {
                eprintln!("{error}");
                ExitCode::FAILURE
            }
        },
        _ => {
            let runner = match Runner::new(&source, &path) {
                Ok(runner) => runner,
                Err(error) => {
                    eprintln!("{error}");
                    return ExitCode::FAILURE;
                }
            };
            let result = if trace {
                runner.run_with(Box::new(skua::StdPrint), Box::new(StderrTracer))
            } else {
                runner.run()
            };
            match result {
                Ok(Object::Undefined) => ExitCode::SUCCESS,
                Ok(value) => {
                    println!("{value:?}");
                    ExitCode::SUCCESS
                }
                Err(error) => {
                    eprintln!("{error}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
