//! Exporters turning the dependency graph into project, solution and build files.

pub mod build_file;
pub mod project;
pub mod solution;

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::ProjgenError;

/// A fully rendered output file waiting to be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub contents: String,
    pub kind: FileKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    /// Human-editable; created once and never overwritten.
    Primary,
    /// Always overwritten.
    Generated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Preserved,
}

impl RenderedFile {
    pub fn generated(path: PathBuf, contents: String) -> Self {
        Self {
            path,
            contents,
            kind: FileKind::Generated,
        }
    }

    pub fn primary(path: PathBuf, contents: String) -> Self {
        Self {
            path,
            contents,
            kind: FileKind::Primary,
        }
    }

    pub fn write(&self, read_only: bool) -> Result<WriteOutcome, ProjgenError> {
        match self.kind {
            FileKind::Primary => write_primary(&self.path, &self.contents),
            FileKind::Generated => {
                write_generated(&self.path, &self.contents, read_only).map(|_| WriteOutcome::Written)
            }
        }
    }
}

/// Overwrites a generated file, clearing and restoring the read-only flag when requested.
pub fn write_generated(path: &Path, contents: &str, read_only: bool) -> Result<(), ProjgenError> {
    ensure_parent(path)?;
    if let Ok(metadata) = fs::metadata(path) {
        let mut permissions = metadata.permissions();
        if permissions.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            fs::set_permissions(path, permissions)
                .map_err(|err| ProjgenError::from(err).context(path.display()))?;
        }
    }
    fs::write(path, contents).map_err(|err| ProjgenError::from(err).context(path.display()))?;
    if read_only {
        let mut permissions = fs::metadata(path)
            .map_err(|err| ProjgenError::from(err).context(path.display()))?
            .permissions();
        permissions.set_readonly(true);
        fs::set_permissions(path, permissions)
            .map_err(|err| ProjgenError::from(err).context(path.display()))?;
    }
    tracing::info!(path = %path.display(), "wrote generated file");
    Ok(())
}

/// Creates a primary file only when it does not exist yet.
pub fn write_primary(path: &Path, contents: &str) -> Result<WriteOutcome, ProjgenError> {
    if path.exists() {
        tracing::debug!(path = %path.display(), "keeping existing primary file");
        return Ok(WriteOutcome::Preserved);
    }
    ensure_parent(path)?;
    fs::write(path, contents).map_err(|err| ProjgenError::from(err).context(path.display()))?;
    tracing::info!(path = %path.display(), "created primary file");
    Ok(WriteOutcome::Written)
}

fn ensure_parent(path: &Path) -> Result<(), ProjgenError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|err| ProjgenError::from(err).context(parent.display()))?;
        }
    }
    Ok(())
}

/// Path of `target` relative to the directory `base`, with `/` separators. Relative targets are
/// returned unchanged.
pub fn relative_path(base: &Path, target: &Path) -> String {
    if target.is_relative() {
        return slash_path(target);
    }
    let base: Vec<Component<'_>> = base.components().collect();
    let target_parts: Vec<Component<'_>> = target.components().collect();
    if base.first() != target_parts.first() {
        return slash_path(target);
    }
    let common = base
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<String> = Vec::new();
    for _ in common..base.len() {
        parts.push("..".into());
    }
    for part in &target_parts[common..] {
        parts.push(part.as_os_str().to_string_lossy().into_owned());
    }
    if parts.is_empty() {
        ".".into()
    } else {
        parts.join("/")
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|part| part.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Escapes text for element content and double-quoted attribute values.
pub fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}
