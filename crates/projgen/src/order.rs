use std::collections::BTreeSet;

use crate::error::ProjgenError;
use crate::graph::DependencyGraph;

/// Orders modules so every module follows the modules it depends on.
///
/// Each step emits the smallest remaining name whose module dependencies are all emitted, so the
/// order is deterministic. When no module is eligible the remaining names are reported as a cycle
/// and no partial order is returned.
pub fn topological_order(graph: &DependencyGraph) -> Result<Vec<String>, ProjgenError> {
    let mut remaining: BTreeSet<&str> = graph.modules().map(|module| module.name.as_str()).collect();
    let mut emitted: BTreeSet<&str> = BTreeSet::new();
    let mut order = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let next = remaining.iter().copied().find(|name| {
            graph.module(name).is_some_and(|module| {
                module
                    .module_dependencies()
                    .all(|dependency| emitted.contains(dependency) || graph.module(dependency).is_none())
            })
        });
        let Some(name) = next else {
            return Err(ProjgenError::CircularDependency {
                remaining: remaining.iter().map(|name| name.to_string()).collect(),
            });
        };
        remaining.remove(name);
        emitted.insert(name);
        order.push(name.to_string());
    }
    Ok(order)
}
