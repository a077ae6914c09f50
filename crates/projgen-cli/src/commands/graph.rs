use clap::{ArgMatches, Command};
use projgen::{DependencyEdge, ModuleNode, ProjgenError, topological_order};
use serde::Serialize;

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::CliError;

#[derive(Clone, Debug, Serialize)]
pub struct ModuleView {
    pub name: String,
    pub id: String,
    pub class: String,
    pub in_editor: Vec<String>,
    pub player: Vec<String>,
    pub sources: usize,
    pub dependencies: Vec<EdgeView>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EdgeView {
    pub dependency: String,
    pub in_editor: Vec<String>,
    pub player: Vec<String>,
}

impl From<&DependencyEdge> for EdgeView {
    fn from(edge: &DependencyEdge) -> Self {
        Self {
            dependency: edge.dependency.to_string(),
            in_editor: edge.in_editor.iter().cloned().collect(),
            player: edge.player.iter().cloned().collect(),
        }
    }
}

impl From<&ModuleNode> for ModuleView {
    fn from(module: &ModuleNode) -> Self {
        Self {
            name: module.name.clone(),
            id: module.id.to_string(),
            class: module.class.to_string(),
            in_editor: module.in_editor.iter().cloned().collect(),
            player: module.player.iter().cloned().collect(),
            sources: module.sources.len(),
            dependencies: module.dependencies.iter().map(EdgeView::from).collect(),
        }
    }
}

pub fn command() -> Command {
    Command::new("graph")
        .about("Show modules, plugins, dependency edges with platform sets, and the emission order")
}

/// A cycle is reported in the result instead of failing the command, so the rest of the graph
/// is still visible.
pub fn run(session: &CliSession, _matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let build = session.context.build_graph()?;
    let (order, cycle) = match topological_order(&build.graph) {
        Ok(order) => (Some(order), None),
        Err(ProjgenError::CircularDependency { remaining }) => (None, Some(remaining)),
        Err(err) => return Err(err.into()),
    };
    Ok(CommandResult::Graph {
        modules: build.graph.modules().map(ModuleView::from).collect(),
        plugins: build.graph.plugins().cloned().collect(),
        order,
        cycle,
        diagnostics: build.diagnostics,
    })
}
