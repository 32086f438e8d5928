#![forbid(unsafe_code)]

use chain_bootstrap::cli::{passphrase_source, render_error, Cli};
use chain_bootstrap::dispatch::{run_command, Env};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let protocol = cli.protocol;
    let passphrases = passphrase_source();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let result = cli.command.into_command().and_then(|command| {
        let mut env = Env {
            passphrases: passphrases.as_ref(),
            out: &mut out,
        };
        run_command(protocol, command, &mut env)
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", render_error(&e));
            ExitCode::from(1)
        }
    }
}
