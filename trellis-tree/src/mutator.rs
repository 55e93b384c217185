//! Copy-on-write application of operation batches to a structure tree.
//!
//! Every entry point borrows the input tree and returns a fresh tree;
//! callers keep the pre-mutation snapshot for checkpointing. Malformed or
//! unresolvable operations degrade to no-ops so one bad operation never
//! poisons the rest of a batch.

use trellis_core::{
    new_node_id, MovePosition, NodeDraft, NodeId, OpAction, Operation, ProjectNode,
};
use tracing::{debug, warn};

/// Apply a batch of operations in order, feeding each operation the tree
/// produced by the previous one.
pub fn apply_all(tree: &[ProjectNode], operations: &[Operation]) -> Vec<ProjectNode> {
    operations
        .iter()
        .fold(tree.to_vec(), |current, operation| apply_one(&current, operation))
}

/// Apply a single operation, returning the (possibly unchanged) new tree.
pub fn apply_one(tree: &[ProjectNode], operation: &Operation) -> Vec<ProjectNode> {
    match operation.action {
        OpAction::Add => apply_add(tree, operation),
        OpAction::Update => apply_update(tree, operation),
        OpAction::Delete => apply_delete(tree, operation),
        OpAction::Move => apply_move(tree, operation),
    }
}

/// Depth-first search for a node by id.
pub fn find_node(nodes: &[ProjectNode], node_id: NodeId) -> Option<&ProjectNode> {
    for node in nodes {
        if node.id == node_id {
            return Some(node);
        }
        if let Some(found) = find_node(&node.children, node_id) {
            return Some(found);
        }
    }
    None
}

/// Whether the tree contains a node with the given id.
pub fn contains_node(nodes: &[ProjectNode], node_id: NodeId) -> bool {
    find_node(nodes, node_id).is_some()
}

// ============================================================================
// ADD
// ============================================================================

fn apply_add(tree: &[ProjectNode], operation: &Operation) -> Vec<ProjectNode> {
    let Some(draft) = &operation.node_data else {
        debug!("add operation carries no nodeData, skipping");
        return tree.to_vec();
    };
    let Some(node) = build_node(draft) else {
        debug!("add operation nodeData lacks a usable type/name, skipping");
        return tree.to_vec();
    };

    match operation.target_parent_id {
        None => append_to_root(tree, node),
        Some(parent_id) => {
            let (next, inserted) = append_to_parent(tree, parent_id, &node);
            if inserted {
                next
            } else {
                warn!(
                    parent_id = %parent_id,
                    node = %node.name,
                    "parent not found, appending to root"
                );
                append_to_root(tree, node)
            }
        }
    }
}

/// Materialize a draft into a full node. Returns `None` when the draft is
/// unusable (missing type, missing/blank name, zero quantity).
fn build_node(draft: &NodeDraft) -> Option<ProjectNode> {
    let node_type = draft.node_type?;
    let name = draft.name.as_deref().filter(|n| !n.trim().is_empty())?;
    let quantity = draft.quantity.unwrap_or(1);
    if quantity == 0 {
        return None;
    }
    Some(ProjectNode {
        id: draft.id.unwrap_or_else(new_node_id),
        node_type,
        name: name.to_string(),
        quantity,
        specs: draft.specs.clone().unwrap_or_default(),
        children: Vec::new(),
    })
}

fn append_to_root(tree: &[ProjectNode], node: ProjectNode) -> Vec<ProjectNode> {
    let mut next = tree.to_vec();
    next.push(node);
    next
}

fn append_to_parent(
    nodes: &[ProjectNode],
    parent_id: NodeId,
    child: &ProjectNode,
) -> (Vec<ProjectNode>, bool) {
    let mut inserted = false;
    let next = nodes
        .iter()
        .map(|node| {
            if inserted {
                return node.clone();
            }
            let mut node = node.clone();
            if node.id == parent_id {
                node.children.push(child.clone());
                inserted = true;
            } else {
                let (children, found) = append_to_parent(&node.children, parent_id, child);
                if found {
                    node.children = children;
                    inserted = true;
                }
            }
            node
        })
        .collect();
    (next, inserted)
}

// ============================================================================
// UPDATE
// ============================================================================

fn apply_update(tree: &[ProjectNode], operation: &Operation) -> Vec<ProjectNode> {
    let (Some(node_id), Some(draft)) = (operation.target_node_id, operation.node_data.as_ref())
    else {
        debug!("update operation lacks a target id or nodeData, skipping");
        return tree.to_vec();
    };

    let (next, updated) = update_node(tree, node_id, draft);
    if !updated {
        debug!(node_id = %node_id, "update target not found, skipping");
    }
    next
}

fn update_node(
    nodes: &[ProjectNode],
    node_id: NodeId,
    draft: &NodeDraft,
) -> (Vec<ProjectNode>, bool) {
    let mut updated = false;
    let next = nodes
        .iter()
        .map(|node| {
            if updated {
                return node.clone();
            }
            let mut node = node.clone();
            if node.id == node_id {
                merge_draft(&mut node, draft);
                updated = true;
            } else {
                let (children, found) = update_node(&node.children, node_id, draft);
                if found {
                    node.children = children;
                    updated = true;
                }
            }
            node
        })
        .collect();
    (next, updated)
}

/// Shallow-merge draft fields into an existing node. The node's id and
/// children always survive; a provided specs map replaces the old one
/// wholesale.
fn merge_draft(node: &mut ProjectNode, draft: &NodeDraft) {
    if let Some(node_type) = draft.node_type {
        node.node_type = node_type;
    }
    if let Some(name) = draft.name.as_deref() {
        if !name.trim().is_empty() {
            node.name = name.to_string();
        }
    }
    if let Some(quantity) = draft.quantity {
        if quantity >= 1 {
            node.quantity = quantity;
        }
    }
    if let Some(specs) = &draft.specs {
        node.specs = specs.clone();
    }
}

// ============================================================================
// DELETE
// ============================================================================

fn apply_delete(tree: &[ProjectNode], operation: &Operation) -> Vec<ProjectNode> {
    let Some(node_id) = operation.target_node_id else {
        debug!("delete operation lacks a target id, skipping");
        return tree.to_vec();
    };

    let (next, removed) = remove_subtree(tree, node_id);
    if removed.is_none() {
        debug!(node_id = %node_id, "delete target not found, skipping");
    }
    next
}

/// Remove the node with the given id (and its whole subtree), returning the
/// new tree and the removed subtree if it was found.
fn remove_subtree(
    nodes: &[ProjectNode],
    node_id: NodeId,
) -> (Vec<ProjectNode>, Option<ProjectNode>) {
    let mut removed = None;
    let mut next = Vec::with_capacity(nodes.len());
    for node in nodes {
        if removed.is_none() && node.id == node_id {
            removed = Some(node.clone());
            continue;
        }
        let mut node = node.clone();
        if removed.is_none() {
            let (children, taken) = remove_subtree(&node.children, node_id);
            if taken.is_some() {
                node.children = children;
                removed = taken;
            }
        }
        next.push(node);
    }
    (next, removed)
}

// ============================================================================
// MOVE
// ============================================================================

/// Move = detach the subtree, then reinsert it relative to the anchor.
/// When the anchor vanishes with the detached subtree (moving a node into
/// its own descendant) the move is abandoned and the input tree returned
/// unchanged.
fn apply_move(tree: &[ProjectNode], operation: &Operation) -> Vec<ProjectNode> {
    let Some(node_id) = operation.target_node_id else {
        debug!("move operation lacks a target id, skipping");
        return tree.to_vec();
    };

    let (without, removed) = remove_subtree(tree, node_id);
    let Some(subtree) = removed else {
        debug!(node_id = %node_id, "move target not found, skipping");
        return tree.to_vec();
    };

    let Some(anchor_id) = operation.target_parent_id else {
        return append_to_root(&without, subtree);
    };

    let position = operation.position.unwrap_or(MovePosition::Inside);
    let (next, placed) = match position {
        MovePosition::Inside => append_to_parent(&without, anchor_id, &subtree),
        MovePosition::Before => insert_beside(&without, anchor_id, 0, &subtree),
        MovePosition::After => insert_beside(&without, anchor_id, 1, &subtree),
    };

    if placed {
        next
    } else {
        warn!(
            node_id = %node_id,
            anchor_id = %anchor_id,
            "move anchor not reachable, leaving tree unchanged"
        );
        tree.to_vec()
    }
}

/// Insert `node` into the sibling sequence that contains the anchor, at the
/// anchor's index plus `offset` (0 = before, 1 = after).
fn insert_beside(
    nodes: &[ProjectNode],
    anchor_id: NodeId,
    offset: usize,
    node: &ProjectNode,
) -> (Vec<ProjectNode>, bool) {
    if let Some(index) = nodes.iter().position(|n| n.id == anchor_id) {
        let mut next = nodes.to_vec();
        next.insert(index + offset, node.clone());
        return (next, true);
    }

    let mut inserted = false;
    let next = nodes
        .iter()
        .map(|candidate| {
            if inserted {
                return candidate.clone();
            }
            let mut candidate = candidate.clone();
            let (children, found) = insert_beside(&candidate.children, anchor_id, offset, node);
            if found {
                candidate.children = children;
                inserted = true;
            }
            candidate
        })
        .collect();
    (next, inserted)
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use trellis_core::NodeType;

    fn arb_node_id() -> impl Strategy<Value = NodeId> {
        any::<u128>().prop_map(NodeId::from_u128)
    }

    fn small_tree() -> Vec<ProjectNode> {
        vec![
            ProjectNode::new(NodeType::Subsystem, "Security").with_child(
                ProjectNode::new(NodeType::Device, "Camera")
                    .with_child(ProjectNode::new(NodeType::Feature, "Zoom")),
            ),
            ProjectNode::new(NodeType::Subsystem, "Networking"),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_update_with_random_id_is_noop(node_id in arb_node_id()) {
            let tree = small_tree();
            let op = Operation::new(OpAction::Update)
                .with_node_id(node_id)
                .with_node_data(NodeDraft {
                    name: Some("Renamed".to_string()),
                    ..NodeDraft::default()
                });
            // Freshly generated ids are never in the tree.
            prop_assume!(!contains_node(&tree, node_id));
            prop_assert_eq!(apply_one(&tree, &op), tree);
        }

        #[test]
        fn prop_delete_with_random_id_is_noop(node_id in arb_node_id()) {
            let tree = small_tree();
            prop_assume!(!contains_node(&tree, node_id));
            let op = Operation::new(OpAction::Delete).with_node_id(node_id);
            prop_assert_eq!(apply_one(&tree, &op), tree);
        }

        #[test]
        fn prop_add_grows_root_by_exactly_one(name in "[A-Za-z][A-Za-z ]{0,20}") {
            let tree = small_tree();
            let op = Operation::new(OpAction::Add).with_node_data(NodeDraft {
                node_type: Some(NodeType::Device),
                name: Some(name),
                ..NodeDraft::default()
            });
            let next = apply_one(&tree, &op);
            prop_assert_eq!(next.len(), tree.len() + 1);
        }

        #[test]
        fn prop_move_into_descendant_never_loses_nodes(offset in 0usize..3) {
            let tree = small_tree();
            let source = tree[0].id;
            // Pick an anchor somewhere inside the moved subtree.
            let anchor = match offset {
                0 => tree[0].id,
                1 => tree[0].children[0].id,
                _ => tree[0].children[0].children[0].id,
            };
            let op = Operation::new(OpAction::Move)
                .with_node_id(source)
                .with_parent_id(anchor)
                .with_position(MovePosition::Inside);
            let next = apply_one(&tree, &op);
            prop_assert_eq!(next, tree);
        }
    }
}
