use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProjgenError;

/// Pseudo-platform name used by module descriptors to opt in or out of editor compilation.
pub const EDITOR_PLATFORM: &str = "Editor";

/// Platform names, ordered so that every rendering of a set is deterministic.
pub type PlatformSet = BTreeSet<String>;

/// The two independent compilation situations a platform may support.
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum BuildContext {
    InEditor,
    Player,
}

impl BuildContext {
    pub const ALL: [BuildContext; 2] = [BuildContext::InEditor, BuildContext::Player];

    /// MSBuild configuration name used for this context.
    pub fn configuration(self) -> &'static str {
        match self {
            BuildContext::InEditor => "Editor",
            BuildContext::Player => "Player",
        }
    }
}

impl fmt::Display for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.configuration())
    }
}

#[derive(
    Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum ScriptingBackend {
    #[default]
    Mono,
    Il2cpp,
    Coreclr,
}

impl ScriptingBackend {
    pub fn slug(self) -> &'static str {
        match self {
            ScriptingBackend::Mono => "mono",
            ScriptingBackend::Il2cpp => "il2cpp",
            ScriptingBackend::Coreclr => "coreclr",
        }
    }
}

/// Immutable description of one compilation target supplied by the host.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformDescriptor {
    pub name: String,
    pub build_target: String,
    #[serde(default)]
    pub scripting_backend: ScriptingBackend,
    pub target_framework: String,
    #[serde(default)]
    pub defines: Vec<String>,
    #[serde(default)]
    pub editor_defines: Vec<String>,
    #[serde(default)]
    pub player_defines: Vec<String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub editor_references: Vec<String>,
    #[serde(default)]
    pub player_references: Vec<String>,
}

impl PlatformDescriptor {
    /// Preprocessor defines applying in `context`: common defines first, duplicates dropped.
    pub fn defines(&self, context: BuildContext) -> Vec<&str> {
        let specific = match context {
            BuildContext::InEditor => &self.editor_defines,
            BuildContext::Player => &self.player_defines,
        };
        merge_unique(&self.defines, specific)
    }

    /// Reference assemblies applying in `context`.
    pub fn references(&self, context: BuildContext) -> Vec<&str> {
        let specific = match context {
            BuildContext::InEditor => &self.editor_references,
            BuildContext::Player => &self.player_references,
        };
        merge_unique(&self.references, specific)
    }

    pub fn defines_symbol(&self, context: BuildContext, symbol: &str) -> bool {
        self.defines(context).contains(&symbol)
    }

    /// True when `label` names this platform by display name or build-target identifier.
    pub fn answers_to(&self, label: &str) -> bool {
        self.name.eq_ignore_ascii_case(label) || self.build_target.eq_ignore_ascii_case(label)
    }
}

fn merge_unique<'a>(common: &'a [String], specific: &'a [String]) -> Vec<&'a str> {
    let mut seen = BTreeSet::new();
    common
        .iter()
        .chain(specific.iter())
        .map(String::as_str)
        .filter(|value| seen.insert(*value))
        .collect()
}

/// The globally available platforms for one generation run.
#[derive(Clone, Debug, Default)]
pub struct PlatformTable {
    platforms: BTreeMap<String, PlatformDescriptor>,
}

impl PlatformTable {
    pub fn new(platforms: Vec<PlatformDescriptor>) -> Result<Self, ProjgenError> {
        let mut table = BTreeMap::new();
        for platform in platforms {
            if platform.name.trim().is_empty() {
                return Err(ProjgenError::Config(
                    "platform name must not be empty".into(),
                ));
            }
            if platform.name.eq_ignore_ascii_case(EDITOR_PLATFORM) {
                return Err(ProjgenError::Config(format!(
                    "platform name {EDITOR_PLATFORM} is reserved for the in-editor context"
                )));
            }
            let name = platform.name.clone();
            if table.insert(name.clone(), platform).is_some() {
                return Err(ProjgenError::Config(format!("duplicate platform {name}")));
            }
        }
        Ok(Self { platforms: table })
    }

    pub fn get(&self, name: &str) -> Option<&PlatformDescriptor> {
        self.platforms.get(name)
    }

    /// Looks a platform up by display name or build target, case-insensitively.
    pub fn resolve(&self, label: &str) -> Option<&PlatformDescriptor> {
        self.platforms
            .get(label)
            .or_else(|| self.platforms.values().find(|p| p.answers_to(label)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlatformDescriptor> {
        self.platforms.values()
    }

    pub fn all(&self) -> PlatformSet {
        self.platforms.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.platforms.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn platform(name: &str, defines: &[&str]) -> PlatformDescriptor {
        PlatformDescriptor {
            name: name.into(),
            build_target: format!("{name}Target"),
            scripting_backend: ScriptingBackend::Mono,
            target_framework: "netstandard2.1".into(),
            defines: defines.iter().map(|d| d.to_string()).collect(),
            editor_defines: vec!["UNITY_EDITOR".into()],
            player_defines: Vec::new(),
            references: Vec::new(),
            editor_references: Vec::new(),
            player_references: Vec::new(),
        }
    }

    #[test]
    fn defines_merge_common_and_context_specific() {
        let mut win = platform("Win", &["PLATFORM_WIN", "UNITY_EDITOR"]);
        win.player_defines = vec!["PLAYER".into()];

        assert_eq!(
            win.defines(BuildContext::InEditor),
            vec!["PLATFORM_WIN", "UNITY_EDITOR"]
        );
        assert_eq!(
            win.defines(BuildContext::Player),
            vec!["PLATFORM_WIN", "UNITY_EDITOR", "PLAYER"]
        );
        assert!(win.defines_symbol(BuildContext::Player, "PLAYER"));
        assert!(!win.defines_symbol(BuildContext::InEditor, "PLAYER"));
    }

    #[test]
    fn table_rejects_duplicates_and_reserved_names() {
        let err = PlatformTable::new(vec![platform("Win", &[]), platform("Win", &[])])
            .expect_err("duplicate");
        assert!(matches!(err, ProjgenError::Config(msg) if msg.contains("duplicate")));

        let err = PlatformTable::new(vec![platform("Editor", &[])]).expect_err("reserved");
        assert!(matches!(err, ProjgenError::Config(msg) if msg.contains("reserved")));
    }

    #[test]
    fn resolve_matches_build_target() {
        let table = PlatformTable::new(vec![platform("Win", &[]), platform("Android", &[])])
            .unwrap();
        assert_eq!(table.resolve("androidtarget").unwrap().name, "Android");
        assert_eq!(table.resolve("Win").unwrap().name, "Win");
        assert!(table.resolve("Switch").is_none());
        assert_eq!(
            table.all().into_iter().collect::<Vec<_>>(),
            vec!["Android".to_string(), "Win".to_string()]
        );
    }
}
