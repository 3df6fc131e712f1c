//! Flattening of nested query results

use super::types::{QueryNode, SymbolBindings};
use crate::model::Triple;
use std::collections::BTreeSet;

/// Every triple and every variable binding found anywhere in a result tree
#[derive(Debug, Clone, Default)]
pub struct Collected {
    pub triples: BTreeSet<Triple>,
    pub bindings: SymbolBindings,
}

/// Fold a result tree depth-first, parent before children.
///
/// Triples are unioned into one set and binding sets are unioned per symbol.
pub fn collect(nodes: &[QueryNode]) -> Collected {
    nodes.iter().fold(Collected::default(), fold_node)
}

fn fold_node(acc: Collected, node: &QueryNode) -> Collected {
    let Collected {
        mut triples,
        mut bindings,
    } = acc;

    triples.extend(node.triples.iter().cloned());
    for (symbol, ids) in &node.bindings {
        let merged = bindings.remove(symbol).unwrap_or_default().union(ids);
        bindings.insert(symbol.clone(), merged);
    }

    node.children
        .iter()
        .fold(Collected { triples, bindings }, fold_node)
}
