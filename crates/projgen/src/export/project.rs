//! Per-module project files: `<Name>.Generated.props`, `<Name>.Generated.targets` and the
//! primary `<Name>.csproj`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{RenderedFile, relative_path, xml_escape};
use crate::catalog::TemplateSet;
use crate::error::ProjgenError;
use crate::graph::{DependencyEdge, DependencyGraph, ModuleNode, NodeKind, ReferenceNode};
use crate::platform::{BuildContext, PlatformDescriptor, PlatformSet, PlatformTable};
use crate::template::{Replacements, Template, TokenValue};

/// Condition that never holds; attached to references with no platform in any context.
pub const ALWAYS_FALSE: &str = "'true' == 'false'";

pub fn generated_props_file(output_dir: &Path, module: &str) -> PathBuf {
    output_dir.join(format!("{module}.Generated.props"))
}

pub fn generated_targets_file(output_dir: &Path, module: &str) -> PathBuf {
    output_dir.join(format!("{module}.Generated.targets"))
}

pub fn project_file(output_dir: &Path, module: &str) -> PathBuf {
    output_dir.join(format!("{module}.csproj"))
}

fn configuration_test(context: BuildContext) -> String {
    format!("'$(Configuration)' == '{}'", context.configuration())
}

/// Condition selecting one platform in one context.
pub fn platform_condition(context: BuildContext, platform: &str) -> String {
    format!(
        "{} And '$(Platform)' == '{platform}'",
        configuration_test(context)
    )
}

/// `'$(Configuration)' == 'Editor' And ('$(Platform)' == 'A' Or ...)`, or nothing for an empty set.
pub fn context_clause(context: BuildContext, platforms: &PlatformSet) -> Option<String> {
    if platforms.is_empty() {
        return None;
    }
    let alternatives: Vec<String> = platforms
        .iter()
        .map(|platform| format!("'$(Platform)' == '{platform}'"))
        .collect();
    Some(format!(
        "{} And ({})",
        configuration_test(context),
        alternatives.join(" Or ")
    ))
}

/// Disjunction of the per-context clauses, or [`ALWAYS_FALSE`] when both sets are empty.
pub fn sets_condition(in_editor: &PlatformSet, player: &PlatformSet) -> String {
    let clauses: Vec<String> = [
        context_clause(BuildContext::InEditor, in_editor),
        context_clause(BuildContext::Player, player),
    ]
    .into_iter()
    .flatten()
    .collect();
    match clauses.len() {
        0 => ALWAYS_FALSE.to_string(),
        1 => clauses[0].clone(),
        _ => format!("({})", clauses.join(") Or (")),
    }
}

pub fn edge_condition(edge: &DependencyEdge) -> String {
    sets_condition(&edge.in_editor, &edge.player)
}

/// Renders the three per-module files. Nothing touches the filesystem here.
pub struct ProjectExporter<'a> {
    graph: &'a DependencyGraph,
    platforms: &'a PlatformTable,
    templates: &'a TemplateSet,
    output_dir: &'a Path,
    positions: BTreeMap<&'a str, usize>,
}

impl<'a> ProjectExporter<'a> {
    /// `order` is the topological module order; project references follow it.
    pub fn new(
        graph: &'a DependencyGraph,
        platforms: &'a PlatformTable,
        templates: &'a TemplateSet,
        output_dir: &'a Path,
        order: &'a [String],
    ) -> Self {
        let positions = order
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_str(), idx))
            .collect();
        Self {
            graph,
            platforms,
            templates,
            output_dir,
            positions,
        }
    }

    pub fn export(&self, module: &ModuleNode) -> Result<Vec<RenderedFile>, ProjgenError> {
        let props = self.render_props(module)?;
        let targets = self.render_targets(module)?;
        let project = self.render_project(module)?;
        Ok(vec![
            RenderedFile::generated(generated_props_file(self.output_dir, &module.name), props),
            RenderedFile::generated(
                generated_targets_file(self.output_dir, &module.name),
                targets,
            ),
            RenderedFile::primary(project_file(self.output_dir, &module.name), project),
        ])
    }

    pub fn render_props(&self, module: &ModuleNode) -> Result<String, ProjgenError> {
        let template = &self.templates.generated_props;
        let mut replacements = Replacements::new();
        let root = replacements.root(template);
        replacements.assign(template, root, "PROJECT_GUID", module.id.as_str())?;
        replacements.assign(template, root, "ASSEMBLY_NAME", xml_escape(&module.name))?;
        if let Some(namespace) = &module.root_namespace {
            replacements.assign(template, root, "ROOT_NAMESPACE", xml_escape(namespace))?;
        }
        replacements.assign(
            template,
            root,
            "CONFIGURATIONS",
            TokenValue::sequence(BuildContext::ALL.map(BuildContext::configuration), ";"),
        )?;
        replacements.assign(
            template,
            root,
            "PLATFORMS",
            TokenValue::sequence(self.platforms.iter().map(|p| xml_escape(&p.name)), ";"),
        )?;
        replacements.assign(
            template,
            root,
            "PLATFORM_PROPERTIES",
            TokenValue::sequence(self.platform_properties(module)?, ""),
        )?;

        for source in &module.sources {
            let set = replacements.instance(template, root, "COMPILE")?;
            let path = relative_path(self.output_dir, source);
            replacements.assign(template, set, "SOURCE", xml_escape(&path))?;
        }

        for (edge, dependency) in self.module_references(module) {
            let set = replacements.instance(template, root, "PROJECT_REFERENCE")?;
            let path = relative_path(self.output_dir, &project_file(self.output_dir, &dependency.name));
            replacements.assign(template, set, "PROJECT_PATH", xml_escape(&path))?;
            replacements.assign(template, set, "CONDITION", xml_escape(&edge_condition(edge)))?;
            replacements.assign(template, set, "PROJECT_GUID", dependency.id.as_str())?;
            replacements.assign(template, set, "PROJECT_NAME", xml_escape(&dependency.name))?;
        }

        for edge in &module.dependencies {
            if edge.dependency.kind != NodeKind::Plugin {
                continue;
            }
            let Some(plugin) = self.graph.plugin(&edge.dependency.name) else {
                continue;
            };
            let set = replacements.instance(template, root, "PLUGIN_REFERENCE")?;
            let hint = relative_path(self.output_dir, &plugin.path);
            replacements.assign(template, set, "PLUGIN_NAME", xml_escape(plugin.assembly_name()))?;
            replacements.assign(template, set, "CONDITION", xml_escape(&edge_condition(edge)))?;
            replacements.assign(template, set, "HINT_PATH", xml_escape(&hint))?;
        }

        template.render(&replacements, root)
    }

    /// Module edges sorted by the dependency's position in the topological order.
    fn module_references<'m>(
        &'m self,
        module: &'m ModuleNode,
    ) -> Vec<(&'m DependencyEdge, &'m ModuleNode)> {
        let mut references: Vec<(&DependencyEdge, &ModuleNode)> = module
            .dependencies
            .iter()
            .filter(|edge| edge.dependency.kind == NodeKind::Module)
            .filter_map(|edge| Some((edge, self.graph.module(&edge.dependency.name)?)))
            .collect();
        references.sort_by_key(|(_, dependency)| {
            self.positions
                .get(dependency.name.as_str())
                .copied()
                .unwrap_or(usize::MAX)
        });
        references
    }

    /// One rendered snippet per platform and context the module supports.
    fn platform_properties(&self, module: &ModuleNode) -> Result<Vec<String>, ProjgenError> {
        let node = ReferenceNode::Module(module);
        let mut snippets = Vec::new();
        for platform in self.platforms.iter() {
            for context in BuildContext::ALL {
                if node.platforms(context).contains(&platform.name) {
                    let template = self.templates.platform_props(platform.scripting_backend)?;
                    snippets.push(render_platform(template, platform, context)?);
                }
            }
        }
        Ok(snippets)
    }

    pub fn render_targets(&self, module: &ModuleNode) -> Result<String, ProjgenError> {
        let template = &self.templates.generated_targets;
        let mut replacements = Replacements::new();
        let root = replacements.root(template);
        let supported = sets_condition(&module.in_editor, &module.player);
        replacements.assign(
            template,
            root,
            "UNSUPPORTED_CONDITION",
            xml_escape(&format!("!({supported})")),
        )?;
        replacements.assign(template, root, "PROJECT_NAME", xml_escape(&module.name))?;
        replacements.assign(template, root, "MODULE_CLASS", module.class.to_string())?;
        template.render(&replacements, root)
    }

    pub fn render_project(&self, module: &ModuleNode) -> Result<String, ProjgenError> {
        let template = &self.templates.project;
        let mut replacements = Replacements::new();
        let root = replacements.root(template);
        replacements.assign(template, root, "PROJECT_NAME", xml_escape(&module.name))?;
        template.render(&replacements, root)
    }
}

fn render_platform(
    template: &Template,
    platform: &PlatformDescriptor,
    context: BuildContext,
) -> Result<String, ProjgenError> {
    let mut replacements = Replacements::new();
    let root = replacements.root(template);
    replacements.assign(
        template,
        root,
        "CONDITION",
        xml_escape(&platform_condition(context, &platform.name)),
    )?;
    replacements.assign(
        template,
        root,
        "TARGET_FRAMEWORK",
        xml_escape(&platform.target_framework),
    )?;
    replacements.assign(
        template,
        root,
        "DEFINES",
        TokenValue::sequence(platform.defines(context), ";"),
    )?;
    replacements.assign(template, root, "BUILD_TARGET", xml_escape(&platform.build_target))?;
    replacements.assign(
        template,
        root,
        "SCRIPTING_BACKEND",
        platform.scripting_backend.slug(),
    )?;
    for reference in platform.references(context) {
        let path = Path::new(reference);
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(reference);
        let set = replacements.instance(template, root, "REFERENCE")?;
        replacements.assign(template, set, "REFERENCE_NAME", xml_escape(name))?;
        replacements.assign(template, set, "REFERENCE_PATH", xml_escape(reference))?;
    }
    template.render(&replacements, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::catalog::TemplateCatalog;
    use crate::descriptor::{DefaultModule, HostModule, ModuleDescriptor};
    use crate::order::topological_order;
    use crate::platform::tests::platform;

    fn set(names: &[&str]) -> PlatformSet {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn conditions_cover_each_context() {
        assert_eq!(sets_condition(&set(&[]), &set(&[])), ALWAYS_FALSE);
        assert_eq!(
            sets_condition(&set(&[]), &set(&["Win"])),
            "'$(Configuration)' == 'Player' And ('$(Platform)' == 'Win')"
        );
        assert_eq!(
            sets_condition(&set(&["Mac", "Win"]), &set(&["Win"])),
            "('$(Configuration)' == 'Editor' And ('$(Platform)' == 'Mac' Or '$(Platform)' == 'Win')) Or ('$(Configuration)' == 'Player' And ('$(Platform)' == 'Win'))"
        );
    }

    #[test]
    fn props_list_sources_references_and_platform_groups() {
        let mut win = platform("Win", &["PLATFORM_WIN"]);
        win.references = vec!["/opt/engine/UnityEngine.dll".into()];
        let table = PlatformTable::new(vec![win, platform("Android", &[])]).unwrap();

        let mut core = ModuleDescriptor::new("Core");
        core.root_namespace = Some("Game.Core".into());
        let mut app = ModuleDescriptor::new("App");
        app.references = vec!["Core".into()];
        app.include_platforms = vec!["Win".into()];
        let modules = vec![
            HostModule {
                name: "Core".into(),
                descriptor: Some(core),
                sources: vec![PathBuf::from("/work/Assets/Core/Math.cs")],
            },
            HostModule {
                name: "App".into(),
                descriptor: Some(app),
                sources: vec![PathBuf::from("/work/Assets/App/Main.cs")],
            },
            HostModule {
                name: DefaultModule::Editor.name().into(),
                descriptor: None,
                sources: Vec::new(),
            },
        ];
        let graph = GraphBuilder::new(&table).build(&modules).unwrap().graph;
        let order = topological_order(&graph).unwrap();
        let templates = TemplateCatalog::embedded_only().load_all().unwrap();
        let output = Path::new("/work/Generated");
        let exporter = ProjectExporter::new(&graph, &table, &templates, output, &order);

        let app = graph.module("App").unwrap();
        let props = exporter.render_props(app).unwrap();
        assert!(props.contains(&format!("<ProjectGuid>{{{}}}</ProjectGuid>", app.id)));
        assert!(props.contains("<Compile Include=\"../Assets/App/Main.cs\" />"));
        assert!(props.contains("<ProjectReference Include=\"Core.csproj\""));
        assert!(props.contains(
            "Condition=\"('$(Configuration)' == 'Editor' And ('$(Platform)' == 'Win')) Or ('$(Configuration)' == 'Player' And ('$(Platform)' == 'Win'))\""
        ));
        assert!(props.contains("<RootNamespace></RootNamespace>"));
        assert!(props.contains("<Configurations>Editor;Player</Configurations>"));
        assert!(props.contains("<Platforms>Android;Win</Platforms>"));
        assert!(props.contains("<DefineConstants>PLATFORM_WIN;UNITY_EDITOR</DefineConstants>"));
        assert!(props.contains("<HintPath>/opt/engine/UnityEngine.dll</HintPath>"));
        assert!(!props.contains("'$(Platform)' == 'Android'\""));

        let core = exporter.render_props(graph.module("Core").unwrap()).unwrap();
        assert!(core.contains("<RootNamespace>Game.Core</RootNamespace>"));
        assert!(!core.contains("<ProjectReference"));

        let editor = graph.module(DefaultModule::Editor.name()).unwrap();
        let props = exporter.render_props(editor).unwrap();
        let app_at = props.find("<Name>App</Name>").unwrap();
        let core_at = props.find("<Name>Core</Name>").unwrap();
        assert!(core_at < app_at);
    }

    #[test]
    fn targets_guard_unsupported_configurations() {
        let table = PlatformTable::new(vec![platform("Win", &[])]).unwrap();
        let mut tools = ModuleDescriptor::new("Tools");
        tools.include_platforms = vec!["Editor".into()];
        let modules = vec![HostModule {
            name: "Tools".into(),
            descriptor: Some(tools),
            sources: Vec::new(),
        }];
        let graph = GraphBuilder::new(&table).build(&modules).unwrap().graph;
        let order = topological_order(&graph).unwrap();
        let templates = TemplateCatalog::embedded_only().load_all().unwrap();
        let exporter =
            ProjectExporter::new(&graph, &table, &templates, Path::new("/out"), &order);

        let module = graph.module("Tools").unwrap();
        let targets = exporter.render_targets(module).unwrap();
        assert!(targets.contains(
            "Condition=\"!('$(Configuration)' == 'Editor' And ('$(Platform)' == 'Win'))\""
        ));
        assert!(targets.contains("Text=\"Tools (EditorModule)\""));

        let files = exporter.export(module).unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(files[2].path, PathBuf::from("/out/Tools.csproj"));
        assert!(files[2].contents.contains("<Import Project=\"Tools.Generated.props\" />"));
    }
}
