use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ProjgenError;
use crate::platform::ScriptingBackend;
use crate::template::{Template, TemplateBackend};

const EMBEDDED_PROJECT: &str = include_str!("../templates/project.csproj");
const EMBEDDED_GENERATED_PROPS: &str = include_str!("../templates/generated.props");
const EMBEDDED_GENERATED_TARGETS: &str = include_str!("../templates/generated.targets");
const EMBEDDED_SOLUTION: &str = include_str!("../templates/solution.sln");
const EMBEDDED_BUILD_FILE: &str = include_str!("../templates/build.proj");
const EMBEDDED_PLATFORM: &str = include_str!("../templates/platform.props");
const EMBEDDED_PLATFORM_IL2CPP: &str = include_str!("../templates/platform.il2cpp.props");

/// Tokens that may legitimately stay empty.
const OPTIONAL_TOKENS: [&str; 1] = ["ROOT_NAMESPACE"];

/// The template shapes an export pass renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TemplateShape {
    Project,
    GeneratedProps,
    GeneratedTargets,
    Solution,
    BuildFile,
    PlatformProps(ScriptingBackend),
}

impl TemplateShape {
    pub fn file_name(self) -> String {
        match self {
            TemplateShape::Project => "project.csproj".into(),
            TemplateShape::GeneratedProps => "generated.props".into(),
            TemplateShape::GeneratedTargets => "generated.targets".into(),
            TemplateShape::Solution => "solution.sln".into(),
            TemplateShape::BuildFile => "build.proj".into(),
            TemplateShape::PlatformProps(backend) => format!("platform.{}.props", backend.slug()),
        }
    }

    /// Shape consulted when no variant exists for this one.
    fn fallback(self) -> Option<(String, &'static str)> {
        match self {
            TemplateShape::PlatformProps(_) => {
                Some(("platform.props".to_string(), EMBEDDED_PLATFORM))
            }
            _ => None,
        }
    }

    fn embedded(self) -> Option<&'static str> {
        match self {
            TemplateShape::Project => Some(EMBEDDED_PROJECT),
            TemplateShape::GeneratedProps => Some(EMBEDDED_GENERATED_PROPS),
            TemplateShape::GeneratedTargets => Some(EMBEDDED_GENERATED_TARGETS),
            TemplateShape::Solution => Some(EMBEDDED_SOLUTION),
            TemplateShape::BuildFile => Some(EMBEDDED_BUILD_FILE),
            TemplateShape::PlatformProps(ScriptingBackend::Il2cpp) => Some(EMBEDDED_PLATFORM_IL2CPP),
            TemplateShape::PlatformProps(_) => None,
        }
    }
}

/// Where a resolved template came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemplateOrigin {
    Override(PathBuf),
    Embedded(String),
}

/// Resolves templates from a workspace override directory first, then the embedded defaults.
#[derive(Clone, Debug, Default)]
pub struct TemplateCatalog {
    override_dir: Option<PathBuf>,
}

impl TemplateCatalog {
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self { override_dir }
    }

    pub fn embedded_only() -> Self {
        Self::default()
    }

    /// Loads and parses one shape following the override, embedded, fallback order.
    pub fn load(&self, shape: TemplateShape) -> Result<(Template, TemplateOrigin), ProjgenError> {
        let file_name = shape.file_name();
        if let Some(found) = self.try_override(&file_name)? {
            return Ok(found);
        }
        if let Some(source) = shape.embedded() {
            return Ok((
                parse(&file_name, source)?,
                TemplateOrigin::Embedded(file_name),
            ));
        }
        if let Some((fallback, source)) = shape.fallback() {
            if let Some(found) = self.try_override(&fallback)? {
                return Ok(found);
            }
            return Ok((
                parse(&fallback, source)?,
                TemplateOrigin::Embedded(fallback),
            ));
        }
        Err(ProjgenError::Config(format!("no template available for {file_name}")))
    }

    fn try_override(
        &self,
        file_name: &str,
    ) -> Result<Option<(Template, TemplateOrigin)>, ProjgenError> {
        let Some(dir) = &self.override_dir else {
            return Ok(None);
        };
        let candidate = dir.join(file_name);
        if !candidate.is_file() {
            return Ok(None);
        }
        let template = load_override(&candidate)?;
        tracing::debug!(template = %candidate.display(), "using workspace template override");
        Ok(Some((template, TemplateOrigin::Override(candidate))))
    }

    /// Loads every shape an export pass needs.
    pub fn load_all(&self) -> Result<TemplateSet, ProjgenError> {
        let mut platform = BTreeMap::new();
        for backend in [
            ScriptingBackend::Mono,
            ScriptingBackend::Il2cpp,
            ScriptingBackend::Coreclr,
        ] {
            platform.insert(backend, self.load(TemplateShape::PlatformProps(backend))?.0);
        }
        Ok(TemplateSet {
            project: self.load(TemplateShape::Project)?.0,
            generated_props: self.load(TemplateShape::GeneratedProps)?.0,
            generated_targets: self.load(TemplateShape::GeneratedTargets)?.0,
            solution: self.load(TemplateShape::Solution)?.0,
            build_file: self.load(TemplateShape::BuildFile)?.0,
            platform,
        })
    }
}

fn parse(name: &str, source: &str) -> Result<Template, ProjgenError> {
    let mut template = Template::parse(name, TemplateBackend::for_path(Path::new(name)), source)?;
    mark_optional(&mut template);
    Ok(template)
}

fn load_override(path: &Path) -> Result<Template, ProjgenError> {
    let mut template = Template::load(path)?;
    mark_optional(&mut template);
    Ok(template)
}

fn mark_optional(template: &mut Template) {
    for name in OPTIONAL_TOKENS {
        template.set_optional_everywhere(name);
    }
}

/// Parsed templates for one export pass.
#[derive(Clone, Debug)]
pub struct TemplateSet {
    pub project: Template,
    pub generated_props: Template,
    pub generated_targets: Template,
    pub solution: Template,
    pub build_file: Template,
    pub platform: BTreeMap<ScriptingBackend, Template>,
}

impl TemplateSet {
    pub fn platform_props(&self, backend: ScriptingBackend) -> Result<&Template, ProjgenError> {
        self.platform.get(&backend).ok_or_else(|| {
            ProjgenError::Config(format!("no platform template for {}", backend.slug()))
        })
    }
}
