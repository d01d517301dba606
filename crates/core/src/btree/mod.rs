//! Order-`m` B-tree with bottom-up splitting.
//!
//! Keys go into a leaf first. A node that reaches `m` keys is split around its
//! middle key, which is promoted into the parent; the split repeats upwards and
//! a split root grows the tree by one level. No node ever keeps `m` keys once
//! its split completes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    config::{BTreeConfig, KeyBounds},
    snapshot::{diff_maps, SnapshotDiff},
    trace::{AttrValue, AttributeChange, Attribute, EventKind, Outcome, Traced, TraceRecorder},
    tree::{InsertOutcome, KeyedEngine, NodeId},
    Result,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BTreeNode {
    pub keys: Vec<i64>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

impl BTreeNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Index of the first key not less than `key`.
    fn position(&self, key: i64) -> usize {
        self.keys.partition_point(|existing| *existing < key)
    }
}

#[derive(Debug)]
pub struct BTree {
    nodes: Vec<BTreeNode>,
    root: Option<NodeId>,
    order: usize,
    len: usize,
    recorder: TraceRecorder,
    bounds: KeyBounds,
}

impl BTree {
    /// Creates an empty tree whose nodes have at most `order` children.
    pub fn new(order: usize) -> Result<Self> {
        BTreeConfig { order }.validate()?;
        Ok(Self {
            nodes: Vec::new(),
            root: None,
            order,
            len: 0,
            recorder: TraceRecorder::new(),
            bounds: KeyBounds::default(),
        })
    }

    pub fn with_bounds(order: usize, bounds: KeyBounds) -> Result<Self> {
        let mut tree = Self::new(order)?;
        tree.bounds = bounds;
        Ok(tree)
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn max_keys(&self) -> usize {
        self.order - 1
    }

    /// Fewest keys a non-root node may hold: `⌈m/2⌉ - 1`.
    pub fn min_keys(&self) -> usize {
        self.order.div_ceil(2) - 1
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&BTreeNode> {
        self.nodes.get(id.idx())
    }

    fn at(&self, id: NodeId) -> &BTreeNode {
        &self.nodes[id.idx()]
    }

    fn at_mut(&mut self, id: NodeId) -> &mut BTreeNode {
        &mut self.nodes[id.idx()]
    }

    fn alloc(&mut self, keys: Vec<i64>, children: Vec<NodeId>, parent: Option<NodeId>) -> NodeId {
        let id = NodeId::from_raw(self.nodes.len() as u32);
        self.nodes.push(BTreeNode {
            keys,
            children,
            parent,
        });
        id
    }

    /// Node ids from the root down to the node holding `key`, or to the leaf
    /// where the search ends.
    pub fn search_path(&self, key: i64) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = self.root;
        while let Some(id) = current {
            path.push(id);
            let node = self.at(id);
            let index = node.position(key);
            if node.keys.get(index) == Some(&key) {
                break;
            }
            current = node.children.get(index).copied();
        }
        path
    }

    /// Node ids from the root to the leaf `key` would be inserted into.
    pub fn insertion_path(&self, key: i64) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = self.root;
        while let Some(id) = current {
            path.push(id);
            let node = self.at(id);
            current = node.children.get(node.position(key)).copied();
        }
        path
    }

    /// Records the walk towards `key`. Returns the node holding it, or the leaf
    /// where the walk ended.
    fn descend(&mut self, root: NodeId, key: i64) -> std::result::Result<NodeId, NodeId> {
        let mut current = root;
        loop {
            let node = self.at(current);
            let index = node.position(key);
            let found = node.keys.get(index) == Some(&key);
            let next = node.children.get(index).copied();

            let mut changes = vec![AttributeChange::set(
                Attribute::Child,
                AttrValue::Int(index as i64),
            )];
            if found {
                changes.push(AttributeChange::set(
                    Attribute::Ordering,
                    AttrValue::Outcome(Outcome::Equal),
                ));
            }
            self.recorder
                .emit(EventKind::Compare, vec![current.into()], changes);

            if found {
                return Ok(current);
            }
            match next {
                Some(next) => {
                    self.recorder.emit(
                        EventKind::Descend,
                        vec![current.into(), next.into()],
                        vec![AttributeChange::set(
                            Attribute::Child,
                            AttrValue::Int(index as i64),
                        )],
                    );
                    current = next;
                }
                None => return Err(current),
            }
        }
    }

    /// Splits `id` while it holds `m` keys, walking up through the parents.
    /// Each pass climbs one level, so the loop is bounded by the height.
    fn split_upwards(&mut self, mut id: NodeId) {
        while self.at(id).keys.len() > self.max_keys() {
            let before = self.at(id).keys.clone();
            let mid = before.len() / 2;
            let promoted = before[mid];
            let left_keys = before[..mid].to_vec();
            let right_keys = before[mid + 1..].to_vec();

            let parent = self.at(id).parent;
            let right_children = if self.at(id).is_leaf() {
                Vec::new()
            } else {
                self.at_mut(id).children.split_off(mid + 1)
            };

            let sibling = self.alloc(right_keys.clone(), right_children.clone(), parent);
            for child in right_children {
                self.at_mut(child).parent = Some(sibling);
            }
            self.at_mut(id).keys = left_keys.clone();

            self.recorder.emit(
                EventKind::Split,
                vec![id.into(), sibling.into()],
                vec![
                    AttributeChange::new(
                        Attribute::Keys,
                        AttrValue::Keys(before),
                        AttrValue::Keys(left_keys),
                    ),
                    AttributeChange::set(Attribute::Keys, AttrValue::Keys(right_keys)),
                ],
            );

            match parent {
                Some(parent) => {
                    let keys_before = self.at(parent).keys.clone();
                    let slot = self
                        .at(parent)
                        .children
                        .iter()
                        .position(|child| *child == id)
                        .unwrap_or(keys_before.len());
                    let node = self.at_mut(parent);
                    node.keys.insert(slot, promoted);
                    node.children.insert(slot + 1, sibling);
                    let keys_after = node.keys.clone();

                    self.recorder.emit(
                        EventKind::Promote,
                        vec![parent.into(), id.into()],
                        vec![AttributeChange::new(
                            Attribute::Keys,
                            AttrValue::Keys(keys_before),
                            AttrValue::Keys(keys_after),
                        )],
                    );
                    id = parent;
                }
                None => {
                    let root = self.alloc(vec![promoted], vec![id, sibling], None);
                    self.at_mut(id).parent = Some(root);
                    self.at_mut(sibling).parent = Some(root);
                    self.root = Some(root);

                    self.recorder.emit(
                        EventKind::Promote,
                        vec![root.into(), id.into()],
                        vec![AttributeChange::set(
                            Attribute::Keys,
                            AttrValue::Keys(vec![promoted]),
                        )],
                    );
                    break;
                }
            }
        }
    }

    pub fn in_order_keys(&self) -> Vec<i64> {
        let mut keys = Vec::with_capacity(self.len);
        if let Some(root) = self.root {
            self.collect_keys(root, &mut keys);
        }
        keys
    }

    fn collect_keys(&self, id: NodeId, out: &mut Vec<i64>) {
        let node = self.at(id);
        for (index, key) in node.keys.iter().enumerate() {
            if let Some(child) = node.children.get(index) {
                self.collect_keys(*child, out);
            }
            out.push(*key);
        }
        if let Some(last) = node.children.get(node.keys.len()) {
            self.collect_keys(*last, out);
        }
    }

    /// Number of levels, `0` when empty.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut current = self.root;
        while let Some(id) = current {
            height += 1;
            current = self.at(id).children.first().copied();
        }
        height
    }

    /// Checks key counts, child counts, ordering, parent links and equal leaf
    /// depth for the whole tree.
    pub fn is_valid(&self) -> bool {
        let Some(root) = self.root else {
            return true;
        };
        let keys = self.in_order_keys();
        if keys.len() != self.len || keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            return false;
        }

        let height = self.height();
        let mut stack = vec![(root, 1usize)];
        while let Some((id, depth)) = stack.pop() {
            let node = self.at(id);
            let count = node.keys.len();
            let min = if id == root { 1 } else { self.min_keys() };
            if count < min || count > self.max_keys() {
                return false;
            }
            if node.is_leaf() {
                if depth != height {
                    return false;
                }
                continue;
            }
            if node.children.len() != count + 1 {
                return false;
            }
            for child in &node.children {
                if self.at(*child).parent != Some(id) {
                    return false;
                }
                stack.push((*child, depth + 1));
            }
        }
        true
    }

    pub fn snapshot(&self) -> BTreeSnapshot {
        let mut nodes = BTreeMap::new();
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            let node = self.at(id);
            nodes.insert(
                id,
                BTreeSnapshotNode {
                    keys: node.keys.clone(),
                    children: node.children.clone(),
                },
            );
            stack.extend(node.children.iter().copied());
        }
        BTreeSnapshot {
            root: self.root,
            nodes,
        }
    }
}

impl KeyedEngine for BTree {
    fn name(&self) -> &'static str {
        "b-tree"
    }

    fn len(&self) -> usize {
        self.len
    }

    fn insert(&mut self, key: i64) -> Result<Traced<InsertOutcome>> {
        self.bounds.check(key)?;

        let outcome = if let Some(root) = self.root {
            match self.descend(root, key) {
                Ok(holder) => InsertOutcome::Duplicate(holder),
                Err(leaf) => {
                    let before = self.at(leaf).keys.clone();
                    let index = self.at(leaf).position(key);
                    self.at_mut(leaf).keys.insert(index, key);
                    let after = self.at(leaf).keys.clone();
                    self.recorder.emit(
                        EventKind::Attach,
                        vec![leaf.into()],
                        vec![AttributeChange::new(
                            Attribute::Keys,
                            AttrValue::Keys(before),
                            AttrValue::Keys(after),
                        )],
                    );
                    self.len += 1;
                    self.split_upwards(leaf);
                    InsertOutcome::Inserted(leaf)
                }
            }
        } else {
            let leaf = self.alloc(vec![key], Vec::new(), None);
            self.root = Some(leaf);
            self.recorder.emit(
                EventKind::Attach,
                vec![leaf.into()],
                vec![AttributeChange::new(
                    Attribute::Keys,
                    AttrValue::Keys(Vec::new()),
                    AttrValue::Keys(vec![key]),
                )],
            );
            self.len += 1;
            InsertOutcome::Inserted(leaf)
        };

        let traced = self.recorder.finish(outcome);
        tracing::debug!(
            key,
            ?outcome,
            splits = traced.trace.count(EventKind::Split),
            events = traced.trace.len(),
            "b-tree insert"
        );
        Ok(traced)
    }

    fn search(&mut self, key: i64) -> Traced<Option<NodeId>> {
        let found = self
            .root
            .and_then(|root| self.descend(root, key).ok());
        self.recorder.finish(found)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BTreeSnapshotNode {
    pub keys: Vec<i64>,
    pub children: Vec<NodeId>,
}

/// Copy of the reachable part of a B-tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BTreeSnapshot {
    pub root: Option<NodeId>,
    pub nodes: BTreeMap<NodeId, BTreeSnapshotNode>,
}

impl BTreeSnapshot {
    pub fn diff(&self, newer: &Self) -> SnapshotDiff<NodeId> {
        diff_maps(&self.nodes, &newer.nodes)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

    use super::*;

    fn build(order: usize, keys: &[i64]) -> BTree {
        let mut tree = BTree::new(order).unwrap();
        for key in keys {
            tree.insert(*key).unwrap();
        }
        tree
    }

    fn root_keys(tree: &BTree) -> Vec<i64> {
        tree.node(tree.root().unwrap()).unwrap().keys.clone()
    }

    #[test]
    fn third_key_splits_the_root() {
        let mut tree = build(3, &[10, 20]);
        let traced = tree.insert(30).unwrap();

        assert_eq!(
            traced.trace.kinds(),
            vec![
                EventKind::Compare,
                EventKind::Attach,
                EventKind::Split,
                EventKind::Promote
            ]
        );
        assert_eq!(root_keys(&tree), vec![20]);
        assert_eq!(tree.height(), 2);
        assert!(tree.is_valid());
    }

    #[test]
    fn scene_sequence_grows_three_levels() {
        let tree = build(3, &[10, 20, 30, 40, 50, 60, 70, 80, 90]);

        assert_eq!(tree.in_order_keys(), vec![10, 20, 30, 40, 50, 60, 70, 80, 90]);
        assert_eq!(root_keys(&tree), vec![40]);
        assert_eq!(tree.height(), 3);
        assert!(tree.is_valid());
    }

    #[test]
    fn random_inserts_keep_leaves_level() {
        let mut rng = StdRng::seed_from_u64(3);
        for order in 3..=6 {
            let mut keys: Vec<i64> = (0..300).collect();
            keys.shuffle(&mut rng);

            let mut tree = BTree::new(order).unwrap();
            for key in keys.iter().take(150) {
                let traced = tree.insert(*key).unwrap();
                assert!(tree.is_valid(), "order {order} broke after {key}");
                assert!(traced.trace.count(EventKind::Split) <= tree.height());
                assert!(traced.trace.is_ordered());
            }
            assert_eq!(tree.len(), 150);
        }
    }

    #[test]
    fn duplicate_stops_at_the_holding_node() {
        let mut tree = build(3, &[10, 20, 30, 40]);
        let before = tree.snapshot();
        let traced = tree.insert(20).unwrap();

        assert!(matches!(traced.value, InsertOutcome::Duplicate(_)));
        let last = traced.trace.last().unwrap();
        assert_eq!(last.kind, EventKind::Compare);
        assert_eq!(
            last.change(Attribute::Ordering).unwrap().after,
            AttrValue::Outcome(Outcome::Equal)
        );
        assert!(before.diff(&tree.snapshot()).is_empty());
    }

    #[test]
    fn search_and_paths() {
        let mut tree = build(3, &[10, 20, 30, 40, 50]);
        assert_eq!(tree.search_path(20).len(), 1);
        assert_eq!(tree.insertion_path(25).len(), 2);

        let traced = tree.search(50);
        assert!(traced.value.is_some());
        assert!(tree.search(55).value.is_none());
    }

    #[test]
    fn split_diff_reports_new_nodes() {
        let mut tree = build(3, &[10, 20]);
        let before = tree.snapshot();
        tree.insert(30).unwrap();
        let changes = before.diff(&tree.snapshot());

        assert_eq!(changes.added.len(), 2);
        assert_eq!(changes.modified.len(), 1);
    }

    #[test]
    fn rejects_small_orders() {
        assert!(matches!(
            BTree::new(2),
            Err(crate::AlgoVizError::InvalidInput(_))
        ));
        let tree = BTree::new(5).unwrap();
        assert_eq!(tree.min_keys(), 2);
        assert_eq!(tree.max_keys(), 4);
    }
}
