use clap::{Arg, ArgMatches, Command};
use projgen::export::build_file::target_names;

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};

const AGGREGATE_TARGET: &str = "Build";
const RESTORE_TARGET: &str = "Restore";

pub fn command() -> Command {
    Command::new("build")
        .about("Run the configured build tool against the generated build.proj")
        .arg(
            Arg::new("target")
                .long("target")
                .short('t')
                .value_name("TARGET")
                .help("Target to build, e.g. Editor_Win. Defaults to every configuration."),
        )
}

pub fn run(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let target = matches
        .get_one::<String>("target")
        .map(String::as_str)
        .unwrap_or(AGGREGATE_TARGET);

    let known = target_names(session.context.platforms());
    if target != AGGREGATE_TARGET && target != RESTORE_TARGET && !known.iter().any(|t| t == target)
    {
        return Err(CliError::new(
            format!(
                "unknown build target '{target}'; expected one of {AGGREGATE_TARGET}, {RESTORE_TARGET}, {}",
                known.join(", ")
            ),
            ExitStatus::Usage,
        ));
    }

    let outcome = session.context.build_runner().run(target)?;
    Ok(CommandResult::Build { outcome })
}
