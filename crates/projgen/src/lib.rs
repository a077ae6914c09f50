pub mod build_tool;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod graph;
pub mod order;
pub mod platform;
pub mod plugin;
pub mod retarget;
pub mod template;

pub use build_tool::{BuildLine, BuildOutcome, BuildRunner, LineKind, Stream, classify_line};
pub use builder::{GraphBuild, GraphBuilder};
pub use catalog::{TemplateCatalog, TemplateOrigin, TemplateSet, TemplateShape};
pub use config::{BuildSettings, MANIFEST_FILE, Manifest, ModuleEntry, discover as discover_manifest};
pub use context::{GenerationContext, GenerationPlan, GenerationReport};
pub use descriptor::{DefaultModule, HostModule, ModuleDescriptor, ProjectClass};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::ProjgenError;
pub use export::solution::{GlobalSection, ProjectMapping, Solution, SolutionProject};
pub use export::{FileKind, RenderedFile, WriteOutcome};
pub use graph::{
    DependencyEdge, DependencyGraph, ModuleNode, NodeId, NodeKey, NodeKind, PluginNode,
    ReferenceNode,
};
pub use order::topological_order;
pub use platform::{
    BuildContext, EDITOR_PLATFORM, PlatformDescriptor, PlatformSet, PlatformTable,
    ScriptingBackend,
};
pub use plugin::{BinaryKind, Enablement, PluginMeta};
pub use retarget::{RetargetOutcome, RetargetRule, retarget_file, retarget_files, retarget_text};
pub use template::{PartId, Replacements, SetId, Template, TemplateBackend, TokenId, TokenValue};
