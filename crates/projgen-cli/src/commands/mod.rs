use projgen::{BuildOutcome, Diagnostics, PluginNode, RetargetOutcome, RetargetRule};
use serde::Serialize;

use crate::error::ExitStatus;

pub mod build;
pub mod generate;
pub mod graph;
pub mod retarget;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandResult {
    Generated {
        root: String,
        order: Vec<String>,
        written: Vec<String>,
        preserved: Vec<String>,
        diagnostics: Diagnostics,
    },
    Graph {
        modules: Vec<graph::ModuleView>,
        plugins: Vec<PluginNode>,
        #[serde(skip_serializing_if = "Option::is_none")]
        order: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cycle: Option<Vec<String>>,
        diagnostics: Diagnostics,
    },
    Build {
        outcome: BuildOutcome,
    },
    Retarget {
        rules: Vec<RetargetRule>,
        outcomes: Vec<RetargetOutcome>,
    },
}

impl CommandResult {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            CommandResult::Generated { diagnostics, .. } => {
                if diagnostics.has_errors() {
                    ExitStatus::Data
                } else {
                    ExitStatus::Ok
                }
            }
            CommandResult::Graph { cycle, .. } => {
                if cycle.is_some() {
                    ExitStatus::Data
                } else {
                    ExitStatus::Ok
                }
            }
            CommandResult::Build { outcome } => {
                if outcome.success() {
                    ExitStatus::Ok
                } else {
                    ExitStatus::BuildFailed
                }
            }
            CommandResult::Retarget { outcomes, .. } => {
                if outcomes.iter().any(|outcome| outcome.error.is_some()) {
                    ExitStatus::Io
                } else {
                    ExitStatus::Ok
                }
            }
        }
    }
}
