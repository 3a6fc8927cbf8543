//! `palisade` administration binary.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use palisade_cli::cli::Cli;
use palisade_cli::Exit;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.run() {
        Ok(()) => Exit::Success.into(),
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            e.exit_code().into()
        }
    }
}
