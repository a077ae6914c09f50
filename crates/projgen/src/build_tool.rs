//! Runs the external build tool against `build.proj` and classifies its output.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::config::BuildSettings;
use crate::error::ProjgenError;
use crate::export::build_file::BUILD_FILE;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Information,
    Warning,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

/// One output line of the build tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BuildLine {
    pub stream: Stream,
    pub kind: LineKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BuildOutcome {
    pub target: String,
    /// `None` when the tool was terminated by a signal.
    pub exit_code: Option<i32>,
    pub lines: Vec<BuildLine>,
}

impl BuildOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn count(&self, kind: LineKind) -> usize {
        self.lines.iter().filter(|line| line.kind == kind).count()
    }
}

fn diagnostic_line() -> &'static Regex {
    static DIAGNOSTIC_LINE: OnceLock<Regex> = OnceLock::new();
    DIAGNOSTIC_LINE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:(?P<origin>(?:[a-zA-Z]:)?[^:]*?)\s*:\s*)?(?:(?P<subcategory>[^:]*?)\s+)?(?P<kind>error|warning)(?:\s+(?P<code>[^\s:]+))?\s*:\s*(?P<text>.*?)\s*$",
        )
        .expect("valid build diagnostic regex")
    })
}

/// Splits an MSBuild-style line into origin, subcategory, kind, code and text. Lines not matching
/// the canonical diagnostic form are information.
pub fn classify_line(stream: Stream, line: &str) -> BuildLine {
    let non_empty = |value: Option<regex::Match<'_>>| {
        value
            .map(|m| m.as_str().trim().to_string())
            .filter(|value| !value.is_empty())
    };
    match diagnostic_line().captures(line) {
        Some(caps) => BuildLine {
            stream,
            kind: if &caps["kind"] == "error" {
                LineKind::Error
            } else {
                LineKind::Warning
            },
            origin: non_empty(caps.name("origin")),
            subcategory: non_empty(caps.name("subcategory")),
            code: non_empty(caps.name("code")),
            text: caps["text"].to_string(),
        },
        None => BuildLine {
            stream,
            kind: LineKind::Information,
            origin: None,
            subcategory: None,
            code: None,
            text: line.trim_end().to_string(),
        },
    }
}

/// Invokes `<tool> <args..> -restore /t:<target> build.proj` inside the output directory.
#[derive(Clone, Debug)]
pub struct BuildRunner {
    settings: BuildSettings,
    working_dir: PathBuf,
}

impl BuildRunner {
    pub fn new(settings: BuildSettings, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            working_dir: working_dir.into(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn command(&self, target: &str) -> Command {
        let mut command = Command::new(&self.settings.tool);
        command
            .args(&self.settings.args)
            .arg("-restore")
            .arg(format!("/t:{target}"))
            .arg(BUILD_FILE)
            .current_dir(&self.working_dir);
        command
    }

    /// Runs once and reports the exit code with every classified line; a failing build is an
    /// outcome, not an error. Only a tool that cannot be started is an error.
    pub fn run(&self, target: &str) -> Result<BuildOutcome, ProjgenError> {
        if !self.working_dir.join(BUILD_FILE).is_file() {
            return Err(ProjgenError::Build(format!(
                "{} not found in {}; run generate first",
                BUILD_FILE,
                self.working_dir.display()
            )));
        }
        tracing::info!(tool = %self.settings.tool, target, "starting build");
        let output = self.command(target).output().map_err(|err| {
            ProjgenError::Build(format!("failed to start {}: {err}", self.settings.tool))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<BuildLine> = stdout
            .lines()
            .map(|line| classify_line(Stream::Stdout, line))
            .chain(stderr.lines().map(|line| classify_line(Stream::Stderr, line)))
            .collect();
        let outcome = BuildOutcome {
            target: target.to_string(),
            exit_code: output.status.code(),
            lines,
        };
        tracing::info!(
            target,
            exit_code = ?outcome.exit_code,
            errors = outcome.count(LineKind::Error),
            warnings = outcome.count(LineKind::Warning),
            "build finished"
        );
        Ok(outcome)
    }
}
