//! The reference item graph: typed module and plugin nodes joined by platform-annotated edges.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::descriptor::ProjectClass;
use crate::platform::{BuildContext, PlatformSet};
use crate::plugin::BinaryKind;

/// Stable node identifier, rendered as a brace-less uppercase GUID.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(String);

impl NodeId {
    /// Derives the identifier from the node name so regenerating never changes it.
    pub fn derive(kind: NodeKind, name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"projgen:");
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(name.as_bytes());
        let digest = hex::encode_upper(&hasher.finalize()[..16]);
        Self(format!(
            "{}-{}-{}-{}-{}",
            &digest[0..8],
            &digest[8..12],
            &digest[12..16],
            &digest[16..20],
            &digest[20..32]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Module,
    Plugin,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Module => "module",
            NodeKind::Plugin => "plugin",
        }
    }
}

/// Addresses a node by kind and name; module and plugin names live in separate namespaces.
#[derive(Clone, Debug, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey {
    pub kind: NodeKind,
    pub name: String,
}

impl NodeKey {
    pub fn module(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Module,
            name: name.into(),
        }
    }

    pub fn plugin(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Plugin,
            name: name.into(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.name)
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ModuleNode {
    pub id: NodeId,
    pub name: String,
    pub class: ProjectClass,
    pub test_only: bool,
    pub auto_referenced: bool,
    pub root_namespace: Option<String>,
    pub sources: Vec<PathBuf>,
    pub in_editor: PlatformSet,
    pub player: PlatformSet,
    pub dependencies: Vec<DependencyEdge>,
}

impl ModuleNode {
    /// Names of the modules this module depends on, in edge order.
    pub fn module_dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .filter(|edge| edge.dependency.kind == NodeKind::Module)
            .map(|edge| edge.dependency.name.as_str())
    }

    pub fn depends_on(&self, key: &NodeKey) -> bool {
        self.dependencies.iter().any(|edge| &edge.dependency == key)
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct PluginNode {
    pub id: NodeId,
    /// File name including extension; explicit plugin references use this form.
    pub name: String,
    pub path: PathBuf,
    pub kind: BinaryKind,
    pub auto_referenced: bool,
    pub define_constraints: Vec<String>,
    pub in_editor: PlatformSet,
    pub player: PlatformSet,
    /// Lives under an explicit-dependencies directory and is never auto-attached.
    pub explicit_only: bool,
}

impl PluginNode {
    /// Assembly name used for hint-path references: the file name without extension.
    pub fn assembly_name(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.name)
    }
}

/// Borrowed view over either node kind.
#[derive(Clone, Copy, Debug)]
pub enum ReferenceNode<'a> {
    Module(&'a ModuleNode),
    Plugin(&'a PluginNode),
}

impl<'a> ReferenceNode<'a> {
    pub fn id(&self) -> &'a NodeId {
        match self {
            ReferenceNode::Module(node) => &node.id,
            ReferenceNode::Plugin(node) => &node.id,
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            ReferenceNode::Module(node) => &node.name,
            ReferenceNode::Plugin(node) => &node.name,
        }
    }

    pub fn key(&self) -> NodeKey {
        match self {
            ReferenceNode::Module(node) => NodeKey::module(&node.name),
            ReferenceNode::Plugin(node) => NodeKey::plugin(&node.name),
        }
    }

    pub fn platforms(&self, context: BuildContext) -> &'a PlatformSet {
        match (self, context) {
            (ReferenceNode::Module(node), BuildContext::InEditor) => &node.in_editor,
            (ReferenceNode::Module(node), BuildContext::Player) => &node.player,
            (ReferenceNode::Plugin(node), BuildContext::InEditor) => &node.in_editor,
            (ReferenceNode::Plugin(node), BuildContext::Player) => &node.player,
        }
    }
}

/// A directed dependency whose platform sets are the per-context intersection of its endpoints.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct DependencyEdge {
    pub dependent: String,
    pub dependency: NodeKey,
    pub in_editor: PlatformSet,
    pub player: PlatformSet,
}

impl DependencyEdge {
    pub fn between(dependent: &ModuleNode, dependency: ReferenceNode<'_>) -> Self {
        let intersect = |context: BuildContext| -> PlatformSet {
            let own = match context {
                BuildContext::InEditor => &dependent.in_editor,
                BuildContext::Player => &dependent.player,
            };
            own.intersection(dependency.platforms(context))
                .cloned()
                .collect()
        };
        Self {
            dependent: dependent.name.clone(),
            dependency: dependency.key(),
            in_editor: intersect(BuildContext::InEditor),
            player: intersect(BuildContext::Player),
        }
    }

    pub fn platforms(&self, context: BuildContext) -> &PlatformSet {
        match context {
            BuildContext::InEditor => &self.in_editor,
            BuildContext::Player => &self.player,
        }
    }

    /// No platform in either context; still exported, under an always-false condition.
    pub fn is_inert(&self) -> bool {
        self.in_editor.is_empty() && self.player.is_empty()
    }
}

/// The closed graph produced by one generation pass.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DependencyGraph {
    modules: BTreeMap<String, ModuleNode>,
    plugins: BTreeMap<String, PluginNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_module(&mut self, node: ModuleNode) {
        self.modules.insert(node.name.clone(), node);
    }

    pub fn insert_plugin(&mut self, node: PluginNode) {
        self.plugins.insert(node.name.clone(), node);
    }

    pub fn module(&self, name: &str) -> Option<&ModuleNode> {
        self.modules.get(name)
    }

    pub fn module_mut(&mut self, name: &str) -> Option<&mut ModuleNode> {
        self.modules.get_mut(name)
    }

    pub fn plugin(&self, name: &str) -> Option<&PluginNode> {
        self.plugins.get(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.modules.values()
    }

    pub fn plugins(&self) -> impl Iterator<Item = &PluginNode> {
        self.plugins.values()
    }

    pub fn node(&self, key: &NodeKey) -> Option<ReferenceNode<'_>> {
        match key.kind {
            NodeKind::Module => self.modules.get(&key.name).map(ReferenceNode::Module),
            NodeKind::Plugin => self.plugins.get(&key.name).map(ReferenceNode::Plugin),
        }
    }

    pub fn edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.modules
            .values()
            .flat_map(|module| module.dependencies.iter())
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Edges whose platform sets escape either endpoint, described for reporting.
    pub fn edge_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        for edge in self.edges() {
            let (Some(dependent), Some(dependency)) =
                (self.modules.get(&edge.dependent), self.node(&edge.dependency))
            else {
                violations.push(format!(
                    "{} -> {} has a missing endpoint",
                    edge.dependent, edge.dependency
                ));
                continue;
            };
            let dependent = ReferenceNode::Module(dependent);
            for context in BuildContext::ALL {
                let set = edge.platforms(context);
                if !set.is_subset(dependent.platforms(context))
                    || !set.is_subset(dependency.platforms(context))
                {
                    violations.push(format!(
                        "{} -> {} exceeds its endpoints in {context}",
                        edge.dependent, edge.dependency
                    ));
                }
            }
        }
        violations
    }
}
