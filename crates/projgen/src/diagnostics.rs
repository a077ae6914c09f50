use serde::Serialize;

/// Severity attached to a non-fatal generation diagnostic.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single best-effort finding, always attributed to the node, template, or file that owns it.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub owner: String,
    pub message: String,
}

/// Ordered collection of diagnostics accumulated during one generation pass.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, owner: impl Into<String>, message: impl Into<String>) {
        let (owner, message) = (owner.into(), message.into());
        tracing::debug!(owner = %owner, "{message}");
        self.push(Severity::Info, owner, message);
    }

    pub fn warn(&mut self, owner: impl Into<String>, message: impl Into<String>) {
        let (owner, message) = (owner.into(), message.into());
        tracing::warn!(owner = %owner, "{message}");
        self.push(Severity::Warning, owner, message);
    }

    pub fn error(&mut self, owner: impl Into<String>, message: impl Into<String>) {
        let (owner, message) = (owner.into(), message.into());
        tracing::error!(owner = %owner, "{message}");
        self.push(Severity::Error, owner, message);
    }

    fn push(&mut self, severity: Severity, owner: String, message: String) {
        self.entries.push(Diagnostic {
            severity,
            owner,
            message,
        });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Diagnostics owned by the given node or file name.
    pub fn for_owner<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.entries.iter().filter(move |entry| entry.owner == owner)
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.severity == Severity::Error)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
