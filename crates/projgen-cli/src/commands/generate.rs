use clap::{ArgMatches, Command};

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::CliError;
use crate::util::display_path;

pub fn command() -> Command {
    Command::new("generate")
        .about("Write project, solution and build files for every module in the manifest")
}

pub fn run(session: &CliSession, _matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let context = &session.context;
    let report = context.generate()?;
    let root = context.root();
    Ok(CommandResult::Generated {
        root: root.display().to_string(),
        order: report.order,
        written: report
            .written
            .iter()
            .map(|path| display_path(root, path))
            .collect(),
        preserved: report
            .preserved
            .iter()
            .map(|path| display_path(root, path))
            .collect(),
        diagnostics: report.diagnostics,
    })
}
