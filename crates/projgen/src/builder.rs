//! Builds the closed dependency graph from host modules and scanned plugins.

use std::path::PathBuf;

use crate::descriptor::{DefaultModule, HostModule, ModuleDescriptor, ProjectClass};
use crate::diagnostics::Diagnostics;
use crate::error::ProjgenError;
use crate::graph::{DependencyEdge, DependencyGraph, ModuleNode, NodeId, NodeKey, NodeKind};
use crate::platform::{EDITOR_PLATFORM, PlatformSet, PlatformTable};
use crate::plugin::{self, BinaryKind};

/// Graph plus the best-effort findings collected while building it.
#[derive(Clone, Debug, Default)]
pub struct GraphBuild {
    pub graph: DependencyGraph,
    pub diagnostics: Diagnostics,
}

pub struct GraphBuilder<'a> {
    platforms: &'a PlatformTable,
    plugin_roots: Vec<PathBuf>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(platforms: &'a PlatformTable) -> Self {
        Self {
            platforms,
            plugin_roots: Vec::new(),
        }
    }

    pub fn with_plugin_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.plugin_roots = roots;
        self
    }

    /// Classifies every module, scans plugins, then resolves references into edges.
    ///
    /// Only an unknown descriptor-less module name is fatal. Unresolved references, unknown
    /// platform names and unreadable plugins are recorded as diagnostics and skipped.
    pub fn build(&self, modules: &[HostModule]) -> Result<GraphBuild, ProjgenError> {
        let mut diagnostics = Diagnostics::new();
        let mut graph = DependencyGraph::new();
        let mut accepted: Vec<&HostModule> = Vec::new();

        for module in modules {
            let class = ProjectClass::classify(module)?;
            if graph.module(&module.name).is_some() {
                diagnostics.warn(
                    module.name.clone(),
                    "module declared more than once; keeping the first declaration",
                );
                continue;
            }
            graph.insert_module(self.module_node(module, class, &mut diagnostics));
            accepted.push(module);
        }

        for plugin in plugin::scan(&self.plugin_roots, self.platforms, &mut diagnostics) {
            graph.insert_plugin(plugin);
        }

        for module in accepted {
            let edges = self.edges_for(&graph, module, &mut diagnostics);
            if let Some(node) = graph.module_mut(&module.name) {
                node.dependencies = edges;
            }
        }

        tracing::debug!(
            modules = graph.module_count(),
            plugins = graph.plugin_count(),
            edges = graph.edges().count(),
            "built dependency graph"
        );
        Ok(GraphBuild { graph, diagnostics })
    }

    fn module_node(
        &self,
        module: &HostModule,
        class: ProjectClass,
        diagnostics: &mut Diagnostics,
    ) -> ModuleNode {
        let all = self.platforms.all();
        let descriptor = module.descriptor.as_ref();
        let (in_editor, mut player) = match (class, descriptor) {
            (ProjectClass::Default(DefaultModule::Runtime), _) => (all.clone(), all),
            (ProjectClass::Default(DefaultModule::Editor), _) | (ProjectClass::EditorModule, _) => {
                (all, PlatformSet::new())
            }
            (ProjectClass::Module, Some(descriptor)) => {
                let derived = self.derived_platforms(&module.name, descriptor, diagnostics);
                let editor = if descriptor.editor_supported() {
                    all
                } else {
                    derived.clone()
                };
                (editor, derived)
            }
            (ProjectClass::Module, None) => (all.clone(), all),
        };
        let test_only = descriptor.is_some_and(|descriptor| descriptor.test_only);
        if test_only {
            player.clear();
        }

        ModuleNode {
            id: NodeId::derive(NodeKind::Module, &module.name),
            name: module.name.clone(),
            class,
            test_only,
            auto_referenced: descriptor.is_none_or(|descriptor| descriptor.auto_referenced),
            root_namespace: descriptor.and_then(|descriptor| descriptor.root_namespace.clone()),
            sources: module.sources.clone(),
            in_editor,
            player,
            dependencies: Vec::new(),
        }
    }

    /// Include list when one is given, otherwise every platform minus the exclude list.
    fn derived_platforms(
        &self,
        owner: &str,
        descriptor: &ModuleDescriptor,
        diagnostics: &mut Diagnostics,
    ) -> PlatformSet {
        if descriptor.include_platforms.is_empty() {
            let excluded = self.resolve_labels(owner, &descriptor.exclude_platforms, diagnostics);
            self.platforms.all().difference(&excluded).cloned().collect()
        } else {
            self.resolve_labels(owner, &descriptor.include_platforms, diagnostics)
        }
    }

    fn resolve_labels(
        &self,
        owner: &str,
        labels: &[String],
        diagnostics: &mut Diagnostics,
    ) -> PlatformSet {
        let mut resolved = PlatformSet::new();
        for label in labels {
            if label.eq_ignore_ascii_case(EDITOR_PLATFORM) {
                continue;
            }
            match self.platforms.resolve(label) {
                Some(platform) => {
                    resolved.insert(platform.name.clone());
                }
                None => diagnostics.warn(owner, format!("unknown platform {label}")),
            }
        }
        resolved
    }

    fn edges_for(
        &self,
        graph: &DependencyGraph,
        module: &HostModule,
        diagnostics: &mut Diagnostics,
    ) -> Vec<DependencyEdge> {
        let Some(node) = graph.module(&module.name) else {
            return Vec::new();
        };
        let mut targets: Vec<NodeKey> = Vec::new();
        let mut add = |key: NodeKey| {
            if !targets.contains(&key) {
                targets.push(key);
            }
        };

        if let Some(descriptor) = &module.descriptor {
            for reference in &descriptor.references {
                if reference == &module.name {
                    diagnostics.warn(&module.name, "module references itself; ignored");
                } else if graph.module(reference).is_some() {
                    add(NodeKey::module(reference));
                } else {
                    diagnostics.warn(&module.name, format!("unresolved reference {reference}"));
                }
            }
        }

        match node.class {
            ProjectClass::Default(DefaultModule::Runtime) => {
                for other in graph.modules() {
                    if other.class == ProjectClass::Module && other.auto_referenced {
                        add(NodeKey::module(&other.name));
                    }
                }
            }
            ProjectClass::Default(DefaultModule::Editor) => {
                let runtime = DefaultModule::Runtime.name();
                if graph.module(runtime).is_some() {
                    add(NodeKey::module(runtime));
                }
                for other in graph.modules() {
                    let eligible =
                        matches!(other.class, ProjectClass::Module | ProjectClass::EditorModule);
                    if eligible && other.auto_referenced {
                        add(NodeKey::module(&other.name));
                    }
                }
            }
            ProjectClass::Module | ProjectClass::EditorModule => {}
        }

        let overrides = module
            .descriptor
            .as_ref()
            .is_some_and(|descriptor| descriptor.override_references);
        if !overrides {
            for plugin in graph.plugins() {
                let attachable = plugin.kind == BinaryKind::Managed
                    && plugin.auto_referenced
                    && !plugin.explicit_only
                    && !(plugin.in_editor.is_empty() && plugin.player.is_empty());
                if attachable {
                    add(NodeKey::plugin(&plugin.name));
                }
            }
        }
        if let Some(descriptor) = &module.descriptor {
            for name in &descriptor.precompiled_references {
                match graph.plugin(name) {
                    Some(plugin) => add(NodeKey::plugin(&plugin.name)),
                    None => diagnostics.warn(
                        &module.name,
                        format!("unresolved precompiled reference {name}"),
                    ),
                }
            }
        }

        targets
            .iter()
            .filter_map(|key| graph.node(key))
            .map(|dependency| DependencyEdge::between(node, dependency))
            .inspect(|edge| {
                if edge.is_inert() {
                    tracing::debug!(
                        module = %edge.dependent,
                        dependency = %edge.dependency,
                        "edge has no platform in either context"
                    );
                }
            })
            .collect()
    }
}
