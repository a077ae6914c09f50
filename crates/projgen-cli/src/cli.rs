use std::ffi::OsString;
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::commands;
use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};
use crate::formatter::{OutputFormat, emit_result};
use crate::util::Verbosity;

const NAME: &str = "projgen";

pub fn run() -> ExitCode {
    init_tracing();
    match run_cli(std::env::args()) {
        Ok(code) => code,
        Err(err) => {
            err.print();
            err.exit_code()
        }
    }
}

/// Parses arguments, resolves the manifest when the command needs one, and dispatches. Returns
/// a sysexits-style `ExitCode`.
pub fn run_cli<I, S>(args: I) -> Result<ExitCode, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let command = build_cli();
    let matches = command.try_get_matches_from(args)?;

    let verbosity = Verbosity {
        json: matches.get_flag("json"),
        verbose: matches.get_flag("verbose"),
    };
    let output = if verbosity.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let workspace_override = matches.get_one::<String>("workspace").cloned();
    let result = dispatch(workspace_override, verbosity, &matches)?;
    emit_result(result, output)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_cli() -> Command {
    Command::new(NAME)
        .about("Generate MSBuild projects and solutions from a module graph")
        .arg(
            Arg::new("workspace")
                .long("workspace")
                .value_name("PATH")
                .global(true)
                .help("Manifest file or project directory. Defaults to the nearest ancestor with a projgen.yaml."),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Emit a single JSON document instead of human-readable text."),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Log the resolved manifest, output directory and platform count."),
        )
        .subcommand_required(true)
        .subcommand(commands::generate::command())
        .subcommand(commands::graph::command())
        .subcommand(commands::build::command())
        .subcommand(commands::retarget::command())
}

/// `retarget` works on plain files and never needs a manifest.
fn dispatch(
    workspace_override: Option<String>,
    verbosity: Verbosity,
    matches: &ArgMatches,
) -> Result<commands::CommandResult, CliError> {
    match matches.subcommand() {
        Some(("retarget", sub)) => commands::retarget::run(sub),
        Some((name, sub)) => {
            let session = CliSession::bootstrap(workspace_override, verbosity)?;
            match name {
                "generate" => commands::generate::run(&session, sub),
                "graph" => commands::graph::run(&session, sub),
                "build" => commands::build::run(&session, sub),
                _ => Err(CliError::new(
                    format!("unknown command {name}"),
                    ExitStatus::Usage,
                )),
            }
        }
        None => Err(CliError::new("missing command", ExitStatus::Usage)),
    }
}
