use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ProjgenError;
use crate::platform::PlatformDescriptor;

/// File name of the generation manifest searched for in ancestor directories.
pub const MANIFEST_FILE: &str = "projgen.yaml";

fn default_output() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_tool() -> String {
    "dotnet".to_string()
}

fn default_tool_args() -> Vec<String> {
    vec!["msbuild".to_string()]
}

/// External build tool invocation, e.g. `dotnet msbuild` or plain `msbuild`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildSettings {
    #[serde(default = "default_tool")]
    pub tool: String,
    #[serde(default = "default_tool_args")]
    pub args: Vec<String>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            args: default_tool_args(),
        }
    }
}

/// A host module entry. Entries without a descriptor must name a default module.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleEntry {
    pub name: String,
    #[serde(default)]
    pub descriptor: Option<PathBuf>,
    /// Source files or directories; directories contribute every `.cs` file beneath them.
    #[serde(default)]
    pub sources: Vec<PathBuf>,
}

/// The generation manifest standing in for the host's asset index.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub solution: String,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub templates: Option<PathBuf>,
    #[serde(default)]
    pub plugins: Vec<PathBuf>,
    #[serde(default = "default_true")]
    pub read_only_generated: bool,
    #[serde(default)]
    pub build: BuildSettings,
    #[serde(default)]
    pub platforms: Vec<PlatformDescriptor>,
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self, ProjgenError> {
        let manifest: Manifest = serde_yaml::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self, ProjgenError> {
        let text =
            fs::read_to_string(path).map_err(|err| ProjgenError::from(err).context(path.display()))?;
        Self::parse(&text).map_err(|err| err.context(path.display()))
    }

    fn validate(&self) -> Result<(), ProjgenError> {
        let solution = self.solution.trim();
        if solution.is_empty() {
            return Err(ProjgenError::Config("solution name must not be empty".into()));
        }
        if solution.contains(['/', '\\']) {
            return Err(ProjgenError::Config(format!(
                "solution name {solution} must not contain path separators"
            )));
        }
        for (idx, module) in self.modules.iter().enumerate() {
            if module.name.trim().is_empty() {
                return Err(ProjgenError::Config(format!(
                    "module entry {idx} has an empty name"
                )));
            }
        }
        Ok(())
    }
}

/// Walks from `start` towards the filesystem root and returns the nearest manifest path.
pub fn discover(start: impl AsRef<Path>) -> Result<PathBuf, ProjgenError> {
    let canonical_start = normalize_start(start.as_ref())?;

    for ancestor in canonical_start.ancestors() {
        let candidate = ancestor.join(MANIFEST_FILE);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(ProjgenError::Config(format!(
        "no {MANIFEST_FILE} found from {}",
        canonical_start.display()
    )))
}

fn normalize_start(start: &Path) -> Result<PathBuf, ProjgenError> {
    let mut cursor = start.to_path_buf();

    // Walk up until a real path exists so not-yet-created paths still resolve.
    while !cursor.exists() {
        if !cursor.pop() {
            return Err(ProjgenError::Config(format!(
                "unable to find existing ancestor for {}",
                start.display()
            )));
        }
    }

    if cursor.is_file() {
        cursor = cursor.parent().map(Path::to_path_buf).ok_or_else(|| {
            ProjgenError::Config(format!(
                "file path {} has no parent directory",
                start.display()
            ))
        })?;
    }

    Ok(fs::canonicalize(cursor)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ScriptingBackend;
    use tempfile::tempdir;

    const MANIFEST: &str = r#"
solution: Game
output: Generated
plugins: [Assets/Plugins]
platforms:
  - name: Win
    build_target: StandaloneWindows64
    target_framework: netstandard2.1
    defines: [PLATFORM_WIN]
    editor_defines: [UNITY_EDITOR]
  - name: Android
    build_target: Android
    scripting_backend: il2cpp
    target_framework: netstandard2.1
modules:
  - name: Assembly-CSharp
    sources: [Assets/Scripts]
  - name: Core
    descriptor: Assets/Core/Core.asmdef
"#;

    #[test]
    fn parse_applies_defaults() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        assert_eq!(manifest.solution, "Game");
        assert_eq!(manifest.output, PathBuf::from("Generated"));
        assert!(manifest.read_only_generated);
        assert_eq!(manifest.build, BuildSettings::default());
        assert_eq!(manifest.platforms.len(), 2);
        assert_eq!(
            manifest.platforms[1].scripting_backend,
            ScriptingBackend::Il2cpp
        );
        assert_eq!(manifest.modules[0].descriptor, None);
        assert_eq!(
            manifest.modules[1].descriptor.as_deref(),
            Some(Path::new("Assets/Core/Core.asmdef"))
        );
    }

    #[test]
    fn parse_rejects_bad_solution_names() {
        let err = Manifest::parse("solution: ''\n").expect_err("empty");
        assert!(matches!(err, ProjgenError::Config(msg) if msg.contains("must not be empty")));

        let err = Manifest::parse("solution: a/b\n").expect_err("separator");
        assert!(matches!(err, ProjgenError::Config(msg) if msg.contains("separators")));
    }

    #[test]
    fn discover_finds_nearest_manifest() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("project");
        let nested = root.join("Assets").join("Scripts");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.join(MANIFEST_FILE), "solution: Game\n").unwrap();

        let found = discover(nested.join("NotYet.cs")).unwrap();
        assert_eq!(
            found,
            root.canonicalize().unwrap().join(MANIFEST_FILE)
        );
    }

    #[test]
    fn discover_errors_without_manifest() {
        let temp = tempdir().unwrap();
        let err = discover(temp.path()).expect_err("missing manifest");
        assert!(matches!(err, ProjgenError::Config(_)));
    }
}
