//! Name-to-id resolution for model-emitted operations.
//!
//! Models refer to nodes by display name; the tree is keyed by id. The
//! resolver walks the current tree into a case-insensitive name index,
//! assigns fresh ids to adds up front so later operations in the same batch
//! can reference nodes that do not exist yet, and rewrites every name-based
//! reference to an id. Unresolvable names are logged and left unset; the
//! mutator then degrades those operations to safe defaults.

use std::collections::HashMap;
use trellis_core::{new_node_id, NodeId, OpAction, Operation, ProjectNode};
use tracing::warn;

/// Build the case-insensitive name index for a tree. Duplicate names are
/// last-write-wins in depth-first order, matching how a user reading the
/// tree top to bottom would disambiguate.
pub fn name_index(tree: &[ProjectNode]) -> HashMap<String, NodeId> {
    let mut index = HashMap::new();
    collect_names(tree, &mut index);
    index
}

fn collect_names(nodes: &[ProjectNode], index: &mut HashMap<String, NodeId>) {
    for node in nodes {
        index.insert(node.name.to_lowercase(), node.id);
        collect_names(&node.children, index);
    }
}

/// Rewrite a batch of operations so every name-based reference carries an
/// id. Returns a new batch; the input is untouched.
pub fn resolve_operations(tree: &[ProjectNode], operations: &[Operation]) -> Vec<Operation> {
    let mut index = name_index(tree);

    operations
        .iter()
        .map(|operation| {
            let mut operation = operation.clone();
            match operation.action {
                OpAction::Add => {
                    resolve_add(&mut operation, &mut index);
                }
                OpAction::Update | OpAction::Delete => {
                    resolve_target(&mut operation, &index);
                }
                OpAction::Move => {
                    resolve_target(&mut operation, &index);
                    resolve_parent(&mut operation, &index);
                }
            }
            operation
        })
        .collect()
}

/// Adds get a fresh id immediately and register their name, so a later
/// operation in the same batch can target the node before it exists.
fn resolve_add(operation: &mut Operation, index: &mut HashMap<String, NodeId>) {
    if let Some(draft) = operation.node_data.as_mut() {
        let node_id = new_node_id();
        draft.id = Some(node_id);
        if let Some(name) = &draft.name {
            index.insert(name.to_lowercase(), node_id);
        }
    }
    resolve_parent(operation, index);
}

fn resolve_parent(operation: &mut Operation, index: &HashMap<String, NodeId>) {
    let Some(parent_name) = operation.target_parent_name.as_deref() else {
        return;
    };
    match index.get(&parent_name.to_lowercase()) {
        Some(parent_id) => operation.target_parent_id = Some(*parent_id),
        None => {
            warn!(parent = parent_name, "parent node not found, defaulting to root");
            operation.target_parent_id = None;
        }
    }
}

fn resolve_target(operation: &mut Operation, index: &HashMap<String, NodeId>) {
    if operation.target_node_id.is_some() {
        return;
    }
    let Some(node_name) = operation.target_node_name.as_deref() else {
        return;
    };
    match index.get(&node_name.to_lowercase()) {
        Some(node_id) => operation.target_node_id = Some(*node_id),
        None => {
            warn!(
                target = node_name,
                action = ?operation.action,
                "target node not found, operation will be skipped"
            );
        }
    }
}
