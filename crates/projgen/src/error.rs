use std::fmt;

use thiserror::Error;

/// High-level error type shared across projgen components.
#[derive(Debug, Error)]
pub enum ProjgenError {
    #[error("template {template}: malformed marker {marker}: {message}")]
    TemplateStructure {
        template: String,
        marker: String,
        message: String,
    },
    #[error("template {template}: no value assigned to required token {token}")]
    MissingToken { template: String, token: String },
    #[error("template {template}: unknown token {token}")]
    UnknownToken { template: String, token: String },
    #[error("template {template}: unknown sub-template {name}")]
    UnknownTemplate { template: String, name: String },
    #[error("unknown default module {0}")]
    UnknownDefaultModule(String),
    #[error("circular dependency among modules: {}", remaining.join(", "))]
    CircularDependency { remaining: Vec<String> },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("solution parse error at line {line}: {message}")]
    SolutionParse { line: usize, message: String },
    #[error("build tool error: {0}")]
    Build(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ProjgenError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for ProjgenError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl ProjgenError {
    /// Prefixes free-form messages with the owning node, template, or file.
    pub fn context<T: fmt::Display>(self, ctx: T) -> Self {
        match self {
            ProjgenError::Config(msg) => ProjgenError::Config(format!("{ctx}: {msg}")),
            ProjgenError::Build(msg) => ProjgenError::Build(format!("{ctx}: {msg}")),
            ProjgenError::Serialization(msg) => {
                ProjgenError::Serialization(format!("{ctx}: {msg}"))
            }
            ProjgenError::SolutionParse { line, message } => ProjgenError::SolutionParse {
                line,
                message: format!("{ctx}: {message}"),
            },
            ProjgenError::Io(err) => {
                ProjgenError::Io(std::io::Error::new(err.kind(), format!("{ctx}: {err}")))
            }
            other => other,
        }
    }

    /// True for the failures that abort a whole generation pass.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProjgenError::TemplateStructure { .. } | ProjgenError::UnknownDefaultModule(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prefixes_messages() {
        let err = ProjgenError::Config("missing platforms".into()).context("projgen.yaml");
        assert_eq!(
            err.to_string(),
            "configuration error: projgen.yaml: missing platforms"
        );
    }

    #[test]
    fn circular_dependency_lists_remaining_modules() {
        let err = ProjgenError::CircularDependency {
            remaining: vec!["A".into(), "B".into()],
        };
        assert_eq!(err.to_string(), "circular dependency among modules: A, B");
        assert!(!err.is_fatal());
        assert!(ProjgenError::UnknownDefaultModule("X".into()).is_fatal());
    }
}
