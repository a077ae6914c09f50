//! One generation run: the loaded manifest, its platform table and template catalog, and the
//! full pass from host modules to files on disk.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::build_tool::BuildRunner;
use crate::builder::{GraphBuild, GraphBuilder};
use crate::catalog::TemplateCatalog;
use crate::config::{self, Manifest, ModuleEntry};
use crate::descriptor::{HostModule, ModuleDescriptor};
use crate::diagnostics::Diagnostics;
use crate::error::ProjgenError;
use crate::export::project::ProjectExporter;
use crate::export::solution::Solution;
use crate::export::{RenderedFile, WriteOutcome, build_file};
use crate::graph::DependencyGraph;
use crate::order::topological_order;
use crate::platform::PlatformTable;

const SOURCE_EXTENSION: &str = "cs";

/// Everything one run needs, passed explicitly instead of living in global caches.
#[derive(Clone, Debug)]
pub struct GenerationContext {
    root: PathBuf,
    manifest: Manifest,
    platforms: PlatformTable,
    catalog: TemplateCatalog,
}

/// Files rendered in memory, not yet written.
#[derive(Clone, Debug)]
pub struct GenerationPlan {
    pub graph: DependencyGraph,
    pub order: Vec<String>,
    pub files: Vec<RenderedFile>,
    pub diagnostics: Diagnostics,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct GenerationReport {
    pub order: Vec<String>,
    pub written: Vec<PathBuf>,
    /// Primary files that already existed and were left alone.
    pub preserved: Vec<PathBuf>,
    pub diagnostics: Diagnostics,
}

impl GenerationContext {
    /// `root` is the directory relative manifest paths resolve against.
    pub fn new(root: impl Into<PathBuf>, manifest: Manifest) -> Result<Self, ProjgenError> {
        let root = root.into();
        let platforms = PlatformTable::new(manifest.platforms.clone())?;
        let catalog = TemplateCatalog::new(manifest.templates.as_ref().map(|dir| resolve(&root, dir)));
        Ok(Self {
            root,
            manifest,
            platforms,
            catalog,
        })
    }

    pub fn from_manifest_path(path: &Path) -> Result<Self, ProjgenError> {
        let path = path
            .canonicalize()
            .map_err(|err| ProjgenError::from(err).context(path.display()))?;
        let manifest = Manifest::load(&path)?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ProjgenError::Config(format!("{} has no parent", path.display())))?;
        Self::new(root, manifest)
    }

    /// Finds the nearest manifest at or above `start`.
    pub fn discover(start: impl AsRef<Path>) -> Result<Self, ProjgenError> {
        let path = config::discover(start)?;
        Self::from_manifest_path(&path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn platforms(&self) -> &PlatformTable {
        &self.platforms
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn output_dir(&self) -> PathBuf {
        resolve(&self.root, &self.manifest.output)
    }

    pub fn solution_file_name(&self) -> String {
        format!("{}.sln", self.manifest.solution.trim())
    }

    pub fn solution_path(&self) -> PathBuf {
        self.output_dir().join(self.solution_file_name())
    }

    pub fn build_runner(&self) -> BuildRunner {
        BuildRunner::new(self.manifest.build.clone(), self.output_dir())
    }

    /// Resolves manifest entries into host modules. A descriptor that cannot be read drops its
    /// module with an error diagnostic; missing source paths are warnings.
    pub fn host_modules(&self, diagnostics: &mut Diagnostics) -> Vec<HostModule> {
        let mut modules = Vec::with_capacity(self.manifest.modules.len());
        for entry in &self.manifest.modules {
            let descriptor = match &entry.descriptor {
                Some(path) => match self.load_descriptor(entry, path, diagnostics) {
                    Some(descriptor) => Some(descriptor),
                    None => continue,
                },
                None => None,
            };
            modules.push(HostModule {
                name: entry.name.clone(),
                descriptor,
                sources: self.sources(entry, diagnostics),
            });
        }
        modules
    }

    fn load_descriptor(
        &self,
        entry: &ModuleEntry,
        path: &Path,
        diagnostics: &mut Diagnostics,
    ) -> Option<ModuleDescriptor> {
        match ModuleDescriptor::load(&resolve(&self.root, path)) {
            Ok(descriptor) => {
                if descriptor.name != entry.name {
                    diagnostics.warn(
                        &entry.name,
                        format!(
                            "descriptor names the module {}; using {}",
                            descriptor.name, entry.name
                        ),
                    );
                }
                Some(descriptor)
            }
            Err(err) => {
                diagnostics.error(&entry.name, format!("module skipped: {err}"));
                None
            }
        }
    }

    fn sources(&self, entry: &ModuleEntry, diagnostics: &mut Diagnostics) -> Vec<PathBuf> {
        let mut sources = Vec::new();
        for source in &entry.sources {
            let path = resolve(&self.root, source);
            if path.is_file() {
                sources.push(path);
            } else if path.is_dir() {
                let walker = WalkDir::new(&path).sort_by_file_name().into_iter();
                for item in walker {
                    match item {
                        Ok(item) if item.file_type().is_file() && is_source(item.path()) => {
                            sources.push(item.into_path());
                        }
                        Ok(_) => {}
                        Err(err) => diagnostics.warn(&entry.name, err.to_string()),
                    }
                }
            } else {
                diagnostics.warn(
                    &entry.name,
                    format!("source path {} does not exist", path.display()),
                );
            }
        }
        sources
    }

    /// Builds the dependency graph; diagnostics include those from resolving the manifest.
    pub fn build_graph(&self) -> Result<GraphBuild, ProjgenError> {
        let mut diagnostics = Diagnostics::new();
        let modules = self.host_modules(&mut diagnostics);
        let plugin_roots = self
            .manifest
            .plugins
            .iter()
            .map(|root| resolve(&self.root, root))
            .collect();
        let mut build = GraphBuilder::new(&self.platforms)
            .with_plugin_roots(plugin_roots)
            .build(&modules)?;
        diagnostics.extend(build.diagnostics);
        for violation in build.graph.edge_violations() {
            diagnostics.error("graph", violation);
        }
        build.diagnostics = diagnostics;
        Ok(build)
    }

    /// Renders every output file in memory. Any template or ordering error aborts the plan before
    /// a single file is written.
    pub fn plan(&self) -> Result<GenerationPlan, ProjgenError> {
        let GraphBuild { graph, diagnostics } = self.build_graph()?;
        let order = topological_order(&graph)?;
        let templates = self.catalog.load_all()?;
        let output_dir = self.output_dir();

        let mut files = Vec::new();
        let exporter =
            ProjectExporter::new(&graph, &self.platforms, &templates, &output_dir, &order);
        for module in order.iter().filter_map(|name| graph.module(name)) {
            files.extend(exporter.export(module).map_err(|err| err.context(&module.name))?);
        }

        let solution_path = self.solution_path();
        let mut solution = Solution::generated(&graph, &self.platforms, &order);
        if let Some(existing) = Solution::load(&solution_path)? {
            solution = solution.merge_existing(existing);
        }
        files.push(RenderedFile::generated(
            solution_path,
            solution.render(&templates.solution)?,
        ));
        files.push(build_file::export(
            &templates.build_file,
            &self.platforms,
            &output_dir,
            &self.solution_file_name(),
        )?);

        Ok(GenerationPlan {
            graph,
            order,
            files,
            diagnostics,
        })
    }

    /// Full pass: plan, then write generated files and create missing primary files.
    pub fn generate(&self) -> Result<GenerationReport, ProjgenError> {
        let plan = self.plan()?;
        let mut report = GenerationReport {
            order: plan.order,
            diagnostics: plan.diagnostics,
            ..GenerationReport::default()
        };
        for file in plan.files {
            match file.write(self.manifest.read_only_generated)? {
                WriteOutcome::Written => report.written.push(file.path),
                WriteOutcome::Preserved => report.preserved.push(file.path),
            }
        }
        tracing::info!(
            modules = report.order.len(),
            written = report.written.len(),
            preserved = report.preserved.len(),
            diagnostics = report.diagnostics.len(),
            "generation finished"
        );
        Ok(report)
    }
}

fn is_source(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION))
}

/// Joins `path` onto `root` unless it is absolute, folding `.` and `..` lexically.
pub fn resolve(root: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolve_folds_relative_segments() {
        let root = Path::new("/work/project");
        assert_eq!(resolve(root, Path::new(".")), PathBuf::from("/work/project"));
        assert_eq!(resolve(root, Path::new("../Gen/./x")), PathBuf::from("/work/Gen/x"));
        assert_eq!(resolve(root, Path::new("/abs")), PathBuf::from("/abs"));
    }

    #[test]
    fn host_modules_expand_directories_and_skip_unreadable_descriptors() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("Assets/Core/Sub")).unwrap();
        fs::write(root.join("Assets/Core/B.cs"), "").unwrap();
        fs::write(root.join("Assets/Core/Sub/A.cs"), "").unwrap();
        fs::write(root.join("Assets/Core/notes.txt"), "").unwrap();
        fs::write(root.join("Assets/Core/Core.asmdef"), r#"{ "name": "Core" }"#).unwrap();
        fs::write(root.join("Assets/Broken.asmdef"), "{ not json").unwrap();

        let manifest = Manifest::parse(
            r#"
solution: Game
modules:
  - name: Core
    descriptor: Assets/Core/Core.asmdef
    sources: [Assets/Core, Assets/Missing]
  - name: Broken
    descriptor: Assets/Broken.asmdef
"#,
        )
        .unwrap();
        let context = GenerationContext::new(root, manifest).unwrap();
        let mut diagnostics = Diagnostics::new();
        let modules = context.host_modules(&mut diagnostics);

        assert_eq!(modules.len(), 1);
        assert_eq!(
            modules[0].sources,
            vec![root.join("Assets/Core/B.cs"), root.join("Assets/Core/Sub/A.cs")]
        );
        assert_eq!(diagnostics.for_owner("Broken").count(), 1);
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.for_owner("Core").count(), 1);
    }
}
