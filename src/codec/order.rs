//! Dependency ordering of units

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use prost_types::FileDescriptorProto;

use crate::error::{FilterError, Result};
use crate::schema::SchemaPool;

/// Sort units so that every unit comes after all the units it depends on.
///
/// Dependencies outside `units` are ignored here; they surface later when
/// the unit is added to a pool. Input order breaks ties.
pub fn dependency_order<'a>(units: &[&'a FileDescriptorProto]) -> Result<Vec<&'a FileDescriptorProto>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(units.len(), units.len() * 2);
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::with_capacity(units.len());
    for (i, unit) in units.iter().enumerate() {
        nodes.entry(unit.name()).or_insert_with(|| graph.add_node(i));
    }

    for unit in units {
        let to = nodes[unit.name()];
        for dependency in &unit.dependency {
            if let Some(&from) = nodes.get(dependency.as_str()) {
                graph.add_edge(from, to, ());
            }
        }
    }

    let sorted = toposort(&graph, None)
        .map_err(|cycle| FilterError::DependencyCycle(units[graph[cycle.node_id()]].name().to_string()))?;
    Ok(sorted.into_iter().map(|node| units[graph[node]]).collect())
}

/// The unit named `root` plus every unit it transitively depends on
pub fn closure<'p>(pool: &'p SchemaPool, root: &str) -> Result<Vec<&'p FileDescriptorProto>> {
    let mut seen = HashSet::new();
    let mut stack = vec![root.to_string()];
    let mut units = Vec::new();
    while let Some(name) = stack.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        let unit = pool.file(&name).ok_or_else(|| FilterError::UndeclaredDependency {
            unit: root.to_string(),
            dependency: name.clone(),
        })?;
        stack.extend(unit.dependency.iter().rev().cloned());
        units.push(unit);
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, deps: &[&str]) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.to_string()),
            dependency: deps.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    fn position(order: &[&FileDescriptorProto], name: &str) -> usize {
        order.iter().position(|u| u.name() == name).unwrap()
    }

    #[test]
    fn test_dependencies_come_first() {
        let top = unit("top.proto", &["left.proto", "right.proto"]);
        let left = unit("left.proto", &["base.proto"]);
        let right = unit("right.proto", &["base.proto"]);
        let base = unit("base.proto", &[]);
        let order = dependency_order(&[&top, &left, &right, &base]).unwrap();

        assert_eq!(order.len(), 4);
        assert!(position(&order, "base.proto") < position(&order, "left.proto"));
        assert!(position(&order, "base.proto") < position(&order, "right.proto"));
        assert!(position(&order, "left.proto") < position(&order, "top.proto"));
        assert!(position(&order, "right.proto") < position(&order, "top.proto"));
    }

    #[test]
    fn test_cycle_is_reported() {
        let a = unit("a.proto", &["b.proto"]);
        let b = unit("b.proto", &["a.proto"]);
        assert!(matches!(dependency_order(&[&a, &b]), Err(FilterError::DependencyCycle(_))));
    }

    #[test]
    fn test_unknown_dependencies_are_ignored() {
        let a = unit("a.proto", &["google/protobuf/any.proto"]);
        let order = dependency_order(&[&a]).unwrap();
        assert_eq!(order[0].name(), "a.proto");
    }
}
