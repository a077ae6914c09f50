//! Line-oriented substring rewriting over many files at once, e.g. moving project files to a new
//! target framework.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use crate::error::ProjgenError;

/// Replaces every occurrence of `find` with `replace` on each line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RetargetRule {
    pub find: String,
    pub replace: String,
}

impl RetargetRule {
    pub fn new(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
        }
    }
}

/// Result for one file: changed line count, or the error message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RetargetOutcome {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Applies the rules in order to each line. Line endings are preserved.
pub fn retarget_text(text: &str, rules: &[RetargetRule]) -> (String, usize) {
    let mut changed = 0;
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let mut rewritten = line.to_string();
        for rule in rules.iter().filter(|rule| !rule.find.is_empty()) {
            if rewritten.contains(rule.find.as_str()) {
                rewritten = rewritten.replace(rule.find.as_str(), &rule.replace);
            }
        }
        if rewritten != line {
            changed += 1;
        }
        out.push_str(&rewritten);
    }
    (out, changed)
}

/// Rewrites one file in place, touching it only when some line changed.
pub fn retarget_file(path: &Path, rules: &[RetargetRule]) -> Result<usize, ProjgenError> {
    let text =
        fs::read_to_string(path).map_err(|err| ProjgenError::from(err).context(path.display()))?;
    let (rewritten, changed) = retarget_text(&text, rules);
    if changed > 0 {
        fs::write(path, rewritten).map_err(|err| ProjgenError::from(err).context(path.display()))?;
        tracing::info!(path = %path.display(), changed, "retargeted file");
    }
    Ok(changed)
}

/// One task per file on the rayon pool. Outcomes come back in input order; a failing file never
/// stops the others.
pub fn retarget_files(paths: &[PathBuf], rules: &[RetargetRule]) -> Vec<RetargetOutcome> {
    paths
        .par_iter()
        .map(|path| match retarget_file(path, rules) {
            Ok(changed) => RetargetOutcome {
                path: path.clone(),
                changed_lines: Some(changed),
                error: None,
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "retarget failed");
                RetargetOutcome {
                    path: path.clone(),
                    changed_lines: None,
                    error: Some(err.to_string()),
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rules_apply_in_order_per_line() {
        let rules = vec![
            RetargetRule::new("netstandard2.0", "netstandard2.1"),
            RetargetRule::new("2.1", "2.1-preview"),
        ];
        let (text, changed) =
            retarget_text("<TF>netstandard2.0</TF>\r\n<Other />\n<TF>net48</TF>", &rules);
        assert_eq!(text, "<TF>netstandard2.1-preview</TF>\r\n<Other />\n<TF>net48</TF>");
        assert_eq!(changed, 1);
    }

    #[test]
    fn unchanged_files_are_not_rewritten_and_failures_stay_local() {
        let temp = tempdir().unwrap();
        let changed = temp.path().join("A.csproj");
        let untouched = temp.path().join("B.csproj");
        let missing = temp.path().join("Missing.csproj");
        fs::write(&changed, "<TF>net48</TF>\n<TF>net48</TF>\n").unwrap();
        fs::write(&untouched, "<TF>netstandard2.1</TF>\n").unwrap();
        let before = fs::metadata(&untouched).unwrap().modified().unwrap();

        let outcomes = retarget_files(
            &[changed.clone(), untouched.clone(), missing.clone()],
            &[RetargetRule::new("net48", "netstandard2.1")],
        );

        assert_eq!(outcomes[0].changed_lines, Some(2));
        assert_eq!(outcomes[1].changed_lines, Some(0));
        assert!(outcomes[2].error.is_some());
        assert_eq!(outcomes[2].path, missing);
        assert_eq!(
            fs::read_to_string(&changed).unwrap(),
            "<TF>netstandard2.1</TF>\n<TF>netstandard2.1</TF>\n"
        );
        assert_eq!(fs::metadata(&untouched).unwrap().modified().unwrap(), before);
    }
}
