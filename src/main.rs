use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input JSON file (title, sections, questions).
    input: PathBuf,

    /// Output .docx path. Missing parent directories are created.
    output: PathBuf,
}

fn run(args: &Args) -> Result<PathBuf> {
    json_to_docx::convert_file(&args.input, &args.output)
        .with_context(|| format!("convert {}", args.input.display()))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // --help and --version are not failures.
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(&args) {
        Ok(saved) => {
            println!("Conversion complete, saved to: {}", saved.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("[ERROR] {e:#}");
            ExitCode::FAILURE
        }
    }
}
