//! dcadmin CLI
//!
//! Administration of a Data Center cluster: cluster snapshots and
//! self-update.

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use dcadmin_core::logging_facility::{init, Profile};
use std::ffi::OsString;
use std::process::ExitCode;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "dcadmin")]
#[command(
    about = "Assists with the administration of a Data Center cluster",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the version of this binary
    Version,
    /// Update this binary in place
    Update(commands::update::UpdateArgs),
    /// Create or restore a cluster data snapshot
    Snapshot(commands::snapshot::SnapshotArgs),
}

/// Exit status for argument errors: a bad or missing command is 1, any other
/// bad argument is 2
fn parse_failure(err: &clap::Error) -> ExitCode {
    let _ = err.print();
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
        ErrorKind::InvalidSubcommand
        | ErrorKind::MissingSubcommand
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => ExitCode::from(1),
        _ => ExitCode::from(2),
    }
}

/// Rewrite the single-dash snapshot options (`-redis=false`, `-pg`, `-d=dir`)
/// and their double-dash short-name spellings (`--d`, `--f`) into the forms
/// clap parses. Only arguments after `snapshot` are touched, and nothing
/// after a `--` terminator.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut in_snapshot = false;
    let mut terminated = false;
    args.into_iter()
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            if !in_snapshot {
                in_snapshot = text == "snapshot";
                return arg;
            }
            if terminated || text == "--" {
                terminated = true;
                return arg;
            }
            let (name, value) = match text.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (text, None),
            };
            let long = match name {
                "-redis" | "--redis" => "--redis",
                "-pg" | "--pg" => "--pg",
                "-d" | "--d" | "--dir" => "--dir",
                "--f" if value.is_none() => "--force",
                _ => return arg,
            };
            match value {
                Some(value) => OsString::from(format!("{}={}", long, value)),
                None => OsString::from(long),
            }
        })
        .collect()
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(err) => return parse_failure(&err),
    };

    init(Profile::from_env());

    match cli.command {
        Commands::Version => commands::version::execute(),
        Commands::Update(args) => match commands::update::execute(args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("update failed: {}", err);
                ExitCode::from(2)
            }
        },
        Commands::Snapshot(args) => {
            let action = args.action;
            match commands::snapshot::execute(args) {
                Ok(code) => code,
                Err(err) => {
                    eprintln!("snapshot {} failed: {}", action, err);
                    ExitCode::from(2)
                }
            }
        }
    }
}
