//! Replays a store-tree operation stream into a root hash.
//!
//! Nodes live in an arena and the stack holds arena indices. Every push
//! creates a leaf; `Parent` and `Child` pop the two topmost entries and push
//! the node joining them:
//!
//! ```text
//! Child:  left = below, right = top
//! Parent: left = top,   right = below
//! hash = H(left.hash || right.hash)
//! ```
//!
//! Disclosed leaves are hashed here from their key and value; hashes for
//! them are never taken from the wire.

use tracing::debug;

use crate::{
    ExecutionResult, Hash32, MalformedReason, ProofError, ProofHasher, ProofLeaf, ProofOperation,
    Result,
};

enum NodeKind {
    Leaf(ProofLeaf),
    Branch { left: usize, right: usize },
}

struct Node {
    hash: Hash32,
    kind: NodeKind,
}

/// Stack entry; `min_key`/`max_key` index the smallest and largest
/// disclosed entry under the node.
#[derive(Clone, Copy)]
struct StackEntry {
    node: usize,
    min_key: Option<usize>,
    max_key: Option<usize>,
}

/// Execute decoded operations, returning the recomputed root and the
/// disclosed entries.
pub fn execute<H: ProofHasher + ?Sized>(
    hasher: &H,
    ops: &[ProofOperation],
) -> Result<ExecutionResult> {
    let mut nodes: Vec<Node> = Vec::with_capacity(ops.len());
    let mut stack: Vec<StackEntry> = Vec::new();
    let mut entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();

    for (op_index, op) in ops.iter().enumerate() {
        match op {
            ProofOperation::Hash(h) => {
                let leaf = NodeKind::Leaf(ProofLeaf::Hash(*h));
                stack.push(push_node(&mut nodes, *h, leaf));
            }
            ProofOperation::KeyValueHash(h) => {
                let leaf = NodeKind::Leaf(ProofLeaf::KeyValueHash(*h));
                stack.push(push_node(&mut nodes, *h, leaf));
            }
            ProofOperation::KeyValueEntry { key, value } => {
                let hash = hasher.hash_kv(key, value)?;
                let entry = entries.len();
                entries.push((key.clone(), value.clone()));
                let leaf = NodeKind::Leaf(ProofLeaf::Entry(entry));
                let mut item = push_node(&mut nodes, hash, leaf);
                item.min_key = Some(entry);
                item.max_key = Some(entry);
                stack.push(item);
            }
            ProofOperation::Parent | ProofOperation::Child => {
                let (Some(top), Some(below)) = (stack.pop(), stack.pop()) else {
                    return Err(MalformedReason::StackUnderflow { op_index }.into());
                };
                let (left, right) = match op {
                    ProofOperation::Parent => (top, below),
                    _ => (below, top),
                };

                if let (Some(l), Some(r)) = (left.max_key, right.min_key) {
                    if entries[l].0 >= entries[r].0 {
                        return Err(MalformedReason::KeyOrder { op_index }.into());
                    }
                }

                let hash = hasher.hash_pair(&nodes[left.node].hash, &nodes[right.node].hash);
                let branch = NodeKind::Branch {
                    left: left.node,
                    right: right.node,
                };
                let mut item = push_node(&mut nodes, hash, branch);
                item.min_key = left.min_key.or(right.min_key);
                item.max_key = right.max_key.or(left.max_key);
                stack.push(item);
            }
        }
    }

    let root = match stack.as_slice() {
        [] => return Err(ProofError::EmptyProof),
        [root] => *root,
        rest => {
            let remaining = rest.len();
            return Err(ProofError::IncompleteProof { remaining });
        }
    };

    let leaves = leaves_in_order(&nodes, root.node);
    let root_hash = nodes[root.node].hash;

    debug!(
        ops = ops.len(),
        leaves = leaves.len(),
        disclosed = entries.len(),
        root = %hex::encode(root_hash),
        "store_tree: executed"
    );

    Ok(ExecutionResult {
        root_hash,
        disclosed_entries: entries,
        leaves,
    })
}

fn push_node(nodes: &mut Vec<Node>, hash: Hash32, kind: NodeKind) -> StackEntry {
    nodes.push(Node { hash, kind });
    StackEntry {
        node: nodes.len() - 1,
        min_key: None,
        max_key: None,
    }
}

/// Leaves under `root`, left to right, without recursion.
fn leaves_in_order(nodes: &[Node], root: usize) -> Vec<ProofLeaf> {
    let mut leaves = Vec::new();
    let mut pending = vec![root];
    while let Some(i) = pending.pop() {
        match &nodes[i].kind {
            NodeKind::Leaf(leaf) => leaves.push(leaf.clone()),
            NodeKind::Branch { left, right } => {
                pending.push(*right);
                pending.push(*left);
            }
        }
    }
    leaves
}
