use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ProjgenError;
use crate::platform::EDITOR_PLATFORM;

fn default_true() -> bool {
    true
}

/// Module descriptor as authored next to the module sources (asmdef-like JSON).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    pub name: String,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub include_platforms: Vec<String>,
    #[serde(default)]
    pub exclude_platforms: Vec<String>,
    #[serde(default)]
    pub root_namespace: Option<String>,
    #[serde(default = "default_true")]
    pub auto_referenced: bool,
    #[serde(default)]
    pub precompiled_references: Vec<String>,
    #[serde(default)]
    pub override_references: bool,
    #[serde(default)]
    pub test_only: bool,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            references: Vec::new(),
            include_platforms: Vec::new(),
            exclude_platforms: Vec::new(),
            root_namespace: None,
            auto_referenced: true,
            precompiled_references: Vec::new(),
            override_references: false,
            test_only: false,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ProjgenError> {
        let content =
            fs::read_to_string(path).map_err(|err| ProjgenError::from(err).context(path.display()))?;
        serde_json::from_str(&content)
            .map_err(|err| ProjgenError::from(err).context(path.display()))
    }

    /// The include list names only the editor pseudo-platform.
    pub fn is_editor_only(&self) -> bool {
        self.include_platforms.len() == 1
            && self.include_platforms[0].eq_ignore_ascii_case(EDITOR_PLATFORM)
    }

    /// The module compiles inside the editor.
    pub fn editor_supported(&self) -> bool {
        if self.include_platforms.is_empty() {
            !contains_label(&self.exclude_platforms, EDITOR_PLATFORM)
        } else {
            contains_label(&self.include_platforms, EDITOR_PLATFORM)
        }
    }
}

fn contains_label(labels: &[String], wanted: &str) -> bool {
    labels.iter().any(|label| label.eq_ignore_ascii_case(wanted))
}

/// One compilable module reported by the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostModule {
    pub name: String,
    pub descriptor: Option<ModuleDescriptor>,
    pub sources: Vec<PathBuf>,
}

/// The fixed set of descriptor-less modules every host project owns.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DefaultModule {
    Runtime,
    Editor,
}

impl DefaultModule {
    pub const ALL: [DefaultModule; 2] = [DefaultModule::Runtime, DefaultModule::Editor];

    pub fn name(self) -> &'static str {
        match self {
            DefaultModule::Runtime => "Assembly-CSharp",
            DefaultModule::Editor => "Assembly-CSharp-Editor",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ProjgenError> {
        Self::ALL
            .into_iter()
            .find(|module| module.name() == name)
            .ok_or_else(|| ProjgenError::UnknownDefaultModule(name.to_string()))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case", tag = "kind", content = "default")]
pub enum ProjectClass {
    Module,
    EditorModule,
    Default(DefaultModule),
}

impl ProjectClass {
    /// Descriptor-backed modules are `Module` or `EditorModule`; descriptor-less ones must be a
    /// known default module.
    pub fn classify(module: &HostModule) -> Result<Self, ProjgenError> {
        match &module.descriptor {
            Some(descriptor) if descriptor.is_editor_only() => Ok(ProjectClass::EditorModule),
            Some(_) => Ok(ProjectClass::Module),
            None => DefaultModule::from_name(&module.name).map(ProjectClass::Default),
        }
    }

    pub fn is_editor(self) -> bool {
        matches!(
            self,
            ProjectClass::EditorModule | ProjectClass::Default(DefaultModule::Editor)
        )
    }
}

impl fmt::Display for ProjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectClass::Module => f.write_str("Module"),
            ProjectClass::EditorModule => f.write_str("EditorModule"),
            ProjectClass::Default(DefaultModule::Runtime) => f.write_str("DefaultRuntime"),
            ProjectClass::Default(DefaultModule::Editor) => f.write_str("DefaultEditor"),
        }
    }
}
