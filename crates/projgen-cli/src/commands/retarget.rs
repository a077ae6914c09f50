use std::path::{Path, PathBuf};

use clap::{Arg, ArgAction, ArgMatches, Command};
use projgen::{RetargetRule, retarget_files};
use walkdir::WalkDir;

use crate::commands::CommandResult;
use crate::error::{CliError, ExitStatus};

/// Extensions picked up when a directory is given.
const PROJECT_EXTENSIONS: [&str; 5] = ["csproj", "props", "targets", "proj", "sln"];

pub fn command() -> Command {
    Command::new("retarget")
        .about("Rewrite substrings line by line across project files")
        .arg(
            Arg::new("from")
                .long("from")
                .value_name("TEXT")
                .required(true)
                .action(ArgAction::Append)
                .help("Text to replace; repeat together with --to for several rules"),
        )
        .arg(
            Arg::new("to")
                .long("to")
                .value_name("TEXT")
                .required(true)
                .action(ArgAction::Append)
                .help("Replacement for the matching --from"),
        )
        .arg(
            Arg::new("files")
                .value_name("FILES")
                .required(true)
                .num_args(1..)
                .help("Files to rewrite; directories contribute their project files"),
        )
}

pub fn run(matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let from: Vec<&String> = matches.get_many::<String>("from").into_iter().flatten().collect();
    let to: Vec<&String> = matches.get_many::<String>("to").into_iter().flatten().collect();
    if from.len() != to.len() {
        return Err(CliError::new(
            format!(
                "every --from needs a matching --to (got {} and {})",
                from.len(),
                to.len()
            ),
            ExitStatus::Usage,
        ));
    }
    if let Some(empty) = from.iter().position(|text| text.is_empty()) {
        return Err(CliError::new(
            format!("--from value {} must not be empty", empty + 1),
            ExitStatus::Usage,
        ));
    }
    let rules: Vec<RetargetRule> = from
        .into_iter()
        .zip(to)
        .map(|(find, replace)| RetargetRule::new(find.as_str(), replace.as_str()))
        .collect();

    let mut paths = Vec::new();
    for input in matches.get_many::<String>("files").into_iter().flatten() {
        expand(Path::new(input), &mut paths);
    }
    if paths.is_empty() {
        return Err(CliError::new("no files to retarget", ExitStatus::Usage));
    }

    let outcomes = retarget_files(&paths, &rules);
    Ok(CommandResult::Retarget { rules, outcomes })
}

fn expand(input: &Path, paths: &mut Vec<PathBuf>) {
    if !input.is_dir() {
        paths.push(input.to_path_buf());
        return;
    }
    for entry in WalkDir::new(input).sort_by_file_name().into_iter().flatten() {
        if entry.file_type().is_file() && is_project_file(entry.path()) {
            paths.push(entry.into_path());
        }
    }
}

fn is_project_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| PROJECT_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}
