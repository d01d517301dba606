//! Immutable copies of engine state, structural diffs, and event replay.
//!
//! A renderer that only receives trace events can keep its own
//! [`TreeSnapshot`] in sync by replaying them; the tests use the same path to
//! check that a trace fully explains the change it describes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    trace::{Attribute, AttrValue, EventKind, TraceEvent},
    tree::{BinaryTree, Color, NodeId, NodeTag, Side},
    AlgoVizError, Result,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub key: i64,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    pub parent: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

impl SnapshotNode {
    fn child_mut(&mut self, side: Side) -> &mut Option<NodeId> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    fn child(&self, side: Side) -> Option<NodeId> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }
}

/// Copy of a binary tree at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub root: Option<NodeId>,
    pub nodes: BTreeMap<NodeId, SnapshotNode>,
}

impl TreeSnapshot {
    pub fn capture<T: NodeTag>(tree: &BinaryTree<T>) -> Self {
        let nodes = tree
            .iter()
            .map(|(id, node)| {
                (
                    id,
                    SnapshotNode {
                        key: node.key,
                        left: node.left,
                        right: node.right,
                        parent: node.parent,
                        color: node.tag.color(),
                    },
                )
            })
            .collect();
        Self {
            root: tree.root(),
            nodes,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Applies every event in order. Stops at the first event that does not
    /// fit the snapshot.
    pub fn replay<'a, I>(&mut self, events: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a TraceEvent>,
    {
        for event in events {
            self.apply(event)?;
        }
        Ok(())
    }

    /// Applies a single event. Compare/descend and heap or hull events leave
    /// the snapshot untouched.
    pub fn apply(&mut self, event: &TraceEvent) -> Result<()> {
        match event.kind {
            EventKind::Attach => self.apply_attach(event),
            EventKind::Recolor => {
                let id = subject(event, 0)?;
                let color = match event.change(Attribute::Color).map(|c| &c.after) {
                    Some(AttrValue::Color(color)) => *color,
                    _ => return Err(mismatch(event, "recolor without a color")),
                };
                self.node_mut(id)?.color = Some(color);
                Ok(())
            }
            EventKind::RotateLeft => self.rotate(event, Side::Left),
            EventKind::RotateRight => self.rotate(event, Side::Right),
            EventKind::Detach => self.apply_detach(event),
            EventKind::Replace => {
                let id = subject(event, 0)?;
                let key = changed_key(event)?;
                self.node_mut(id)?.key = key;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn node(&self, id: NodeId) -> Result<&SnapshotNode> {
        self.nodes
            .get(&id)
            .ok_or_else(|| AlgoVizError::invalid(format!("snapshot has no node {id}")))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut SnapshotNode> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| AlgoVizError::invalid(format!("snapshot has no node {id}")))
    }

    fn apply_attach(&mut self, event: &TraceEvent) -> Result<()> {
        let id = match event.subjects.last().and_then(|s| s.as_node()) {
            Some(id) => id,
            None => return Err(mismatch(event, "attach without a node")),
        };
        if self.nodes.contains_key(&id) {
            return Err(mismatch(event, "node already present"));
        }
        let key = changed_key(event)?;
        let color = match event.change(Attribute::Color).map(|c| &c.after) {
            Some(AttrValue::Color(color)) => Some(*color),
            _ => None,
        };

        let parent = if event.subjects.len() > 1 {
            let parent = subject(event, 0)?;
            let side = match event.change(Attribute::Side).map(|c| &c.after) {
                Some(AttrValue::Side(side)) => *side,
                _ => return Err(mismatch(event, "attach under a parent without a side")),
            };
            let slot = self.node_mut(parent)?.child_mut(side);
            if slot.is_some() {
                return Err(mismatch(event, "child slot already taken"));
            }
            *slot = Some(id);
            Some(parent)
        } else {
            if self.root.is_some() {
                return Err(mismatch(event, "root already present"));
            }
            self.root = Some(id);
            None
        };

        self.nodes.insert(
            id,
            SnapshotNode {
                key,
                left: None,
                right: None,
                parent,
                color,
            },
        );
        Ok(())
    }

    /// `direction` is the side the pivot moves towards.
    fn rotate(&mut self, event: &TraceEvent, direction: Side) -> Result<()> {
        let pivot = subject(event, 0)?;
        let child = subject(event, 1)?;
        if self.node(pivot)?.child(direction.opposite()) != Some(child) {
            return Err(mismatch(event, "rotation child is not where expected"));
        }

        let inner = self.node(child)?.child(direction);
        let parent = self.node(pivot)?.parent;

        *self.node_mut(pivot)?.child_mut(direction.opposite()) = inner;
        if let Some(inner) = inner {
            self.node_mut(inner)?.parent = Some(pivot);
        }
        *self.node_mut(child)?.child_mut(direction) = Some(pivot);
        self.node_mut(pivot)?.parent = Some(child);
        self.node_mut(child)?.parent = parent;
        self.relink(parent, pivot, Some(child))
    }

    fn apply_detach(&mut self, event: &TraceEvent) -> Result<()> {
        let id = subject(event, 0)?;
        let node = self.node(id)?.clone();
        if node.left.is_some() && node.right.is_some() {
            return Err(mismatch(event, "cannot detach a node with two children"));
        }
        let lifted = node.left.or(node.right);
        if let Some(lifted) = lifted {
            self.node_mut(lifted)?.parent = node.parent;
        }
        self.relink(node.parent, id, lifted)?;
        self.nodes.remove(&id);
        Ok(())
    }

    /// Points whatever referenced `old` from `parent` (or the root) at `new`.
    fn relink(&mut self, parent: Option<NodeId>, old: NodeId, new: Option<NodeId>) -> Result<()> {
        match parent {
            Some(parent) => {
                let parent = self.node_mut(parent)?;
                if parent.left == Some(old) {
                    parent.left = new;
                } else {
                    parent.right = new;
                }
            }
            None => self.root = new,
        }
        Ok(())
    }
}

fn subject(event: &TraceEvent, index: usize) -> Result<NodeId> {
    event
        .node(index)
        .ok_or_else(|| mismatch(event, "missing node subject"))
}

fn changed_key(event: &TraceEvent) -> Result<i64> {
    event
        .change(Attribute::Key)
        .and_then(|change| change.after.as_int())
        .ok_or_else(|| mismatch(event, "missing key"))
}

fn mismatch(event: &TraceEvent, reason: &str) -> AlgoVizError {
    AlgoVizError::invalid(format!(
        "cannot replay {:?} event #{}: {reason}",
        event.kind, event.ordinal
    ))
}

/// Node-level difference between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff<K: Ord> {
    pub added: BTreeSet<K>,
    pub removed: BTreeSet<K>,
    pub modified: BTreeSet<K>,
    pub unchanged: BTreeSet<K>,
}

impl<K: Ord> SnapshotDiff<K> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Compares two id-keyed node maps.
pub fn diff_maps<K, V>(old: &BTreeMap<K, V>, new: &BTreeMap<K, V>) -> SnapshotDiff<K>
where
    K: Ord + Copy,
    V: PartialEq,
{
    let mut diff = SnapshotDiff {
        added: BTreeSet::new(),
        removed: BTreeSet::new(),
        modified: BTreeSet::new(),
        unchanged: BTreeSet::new(),
    };
    for (id, before) in old {
        match new.get(id) {
            None => {
                diff.removed.insert(*id);
            }
            Some(after) if after == before => {
                diff.unchanged.insert(*id);
            }
            Some(_) => {
                diff.modified.insert(*id);
            }
        }
    }
    diff.added = new
        .keys()
        .filter(|id| !old.contains_key(id))
        .copied()
        .collect();
    diff
}

pub fn diff(old: &TreeSnapshot, new: &TreeSnapshot) -> SnapshotDiff<NodeId> {
    diff_maps(&old.nodes, &new.nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bst::Bst, tree::KeyedEngine};

    #[test]
    fn replaying_bst_traces_rebuilds_the_tree() {
        let mut bst = Bst::new();
        let mut mirror = TreeSnapshot::default();
        for key in [50, 30, 70, 20, 40, 60, 10, 5, 80, 25] {
            let traced = bst.insert(key).unwrap();
            mirror.replay(&traced.trace).unwrap();
        }
        for key in [5, 20, 30, 50] {
            let traced = bst.delete(key).unwrap();
            mirror.replay(&traced.trace).unwrap();
        }

        assert_eq!(mirror, bst.snapshot());
    }

    #[test]
    fn diff_classifies_nodes() {
        let mut bst = Bst::new();
        for key in [50, 30, 70, 20] {
            bst.insert(key).unwrap();
        }
        let before = bst.snapshot();
        bst.delete(50).unwrap();
        bst.insert(10).unwrap();
        let after = bst.snapshot();

        let changes = diff(&before, &after);
        assert_eq!(changes.added.len(), 1);
        assert_eq!(changes.removed.len(), 1);
        // the root took key 70 and lost its right child; 20 gained a child
        assert_eq!(changes.modified.len(), 2);
        assert_eq!(changes.unchanged.len(), 1);
        assert!(!changes.is_empty());
    }

    #[test]
    fn rejects_events_that_do_not_fit() {
        let mut bst = Bst::new();
        bst.insert(1).unwrap();
        let traced = bst.insert(2).unwrap();

        let mut empty = TreeSnapshot::default();
        let err = empty.replay(&traced.trace).unwrap_err();
        assert!(matches!(err, AlgoVizError::InvalidInput(_)));
    }
}
