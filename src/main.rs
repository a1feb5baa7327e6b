use clap::{Arg, Command};
use pebble::runner;
use std::fs;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let matches = Command::new("pebble")
        .about("Runs a pebble script")
        .arg(
            Arg::new("file")
                .help("The script file to execute")
                .value_name("FILE")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("pretty")
                .long("pretty")
                .help("Print colored diagnostics to stderr")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let pretty = matches.get_flag("pretty");
    match matches.get_one::<String>("file") {
        Some(file_path) => run_file(file_path, pretty),
        None => ExitCode::FAILURE,
    }
}

fn run_file(path: &str, pretty: bool) -> ExitCode {
    let path = Path::new(path);

    if !path.exists() {
        eprintln!("Error: File '{}' not found", path.display());
        return ExitCode::FAILURE;
    }

    match fs::read_to_string(path) {
        Ok(source) => {
            let file_name = path.display().to_string();
            if runner::run(&source, &file_name, pretty) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            ExitCode::FAILURE
        }
    }
}
