use std::{env, io, path::Path, process::ExitCode};

use refal::{Machine, RunConfig, StderrMessages, TranslatorConfig};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let Some(file_path) = args.get(1) else {
        eprintln!("usage: refal <source.ref>");
        return ExitCode::FAILURE;
    };
    if args.len() > 2 {
        eprintln!("usage: refal <source.ref>");
        return ExitCode::FAILURE;
    }

    let mut sink = StderrMessages;
    let mut machine = Machine::new();
    if machine
        .translate_file(&TranslatorConfig::default(), Path::new(file_path), &mut sink)
        .is_err()
    {
        // Details already went through the sink.
        return ExitCode::FAILURE;
    }

    let Some(entry) = machine.entry() else {
        eprintln!("{file_path}: the entry function (Go) is not defined");
        return ExitCode::FAILURE;
    };

    let stdout = io::stdout();
    let stdin = io::stdin();
    let mut out = stdout.lock();
    let mut input = stdin.lock();
    match machine.run(&RunConfig::default(), entry, &mut out, &mut input, &mut sink) {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
