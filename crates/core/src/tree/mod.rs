//! Arena-backed binary tree shared by the BST, red-black and AVL engines.
//!
//! Nodes live in a `Vec` and refer to each other through [`NodeId`]s, so parent
//! back-references never form ownership cycles. Identifiers are never reused:
//! a renderer can keep drawing objects keyed by id for the whole run.
//!
//! The structural helpers here (descent, attach, rotations, splicing) record
//! their own trace events. Engines layer their fixup policy on top.

use std::{
    cmp::Ordering,
    collections::VecDeque,
    fmt,
    ops::{Index, IndexMut},
};

use serde::{Deserialize, Serialize};

use crate::{
    trace::{
        Attribute, AttrValue, AttributeChange, EventKind, Outcome, SubjectId, TraceRecorder,
        Traced,
    },
    AlgoVizError, Result,
};

/// Stable identifier of a node inside one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Red-black node color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Color {
    Red,
    Black,
}

/// Per-variant payload carried by every node. The variant is picked once per
/// engine through the type parameter of [`BinaryTree`].
pub trait NodeTag: Clone + fmt::Debug {
    /// Color to expose in snapshots, for variants that have one.
    fn color(&self) -> Option<Color> {
        None
    }
}

impl NodeTag for () {}

impl NodeTag for Color {
    fn color(&self) -> Option<Color> {
        Some(*self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node<T> {
    pub key: i64,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    pub parent: Option<NodeId>,
    pub tag: T,
}

impl<T> Node<T> {
    pub fn child(&self, side: Side) -> Option<NodeId> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    fn child_mut(&mut self, side: Side) -> &mut Option<NodeId> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Result of inserting a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "node", rename_all = "kebab-case")]
pub enum InsertOutcome {
    Inserted(NodeId),
    /// The key was already present; nothing changed.
    Duplicate(NodeId),
}

impl InsertOutcome {
    pub fn node(self) -> NodeId {
        match self {
            Self::Inserted(id) | Self::Duplicate(id) => id,
        }
    }

    pub fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Which deletion case applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeleteCase {
    Leaf,
    OneChild,
    TwoChildren,
    NotFound,
}

/// Common surface of the key-ordered engines, used by the scene runner.
pub trait KeyedEngine {
    fn name(&self) -> &'static str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, key: i64) -> Result<Traced<InsertOutcome>>;

    /// Records the search path for `key` without changing anything.
    fn search(&mut self, key: i64) -> Traced<Option<NodeId>>;

    fn delete(&mut self, _key: i64) -> Result<Traced<DeleteCase>> {
        Err(AlgoVizError::Unsupported("deletion"))
    }
}

/// Where a descent ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descent {
    /// The key is already present at this node.
    Found(NodeId),
    /// The key would hang off `parent` on `side`; `parent` is `None` for an
    /// empty tree.
    Vacant {
        parent: Option<NodeId>,
        side: Side,
    },
}

#[derive(Debug, Clone)]
pub struct BinaryTree<T> {
    nodes: Vec<Option<Node<T>>>,
    root: Option<NodeId>,
    len: usize,
}

impl<T> Default for BinaryTree<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            len: 0,
        }
    }
}

/// # Panics
///
/// Indexing with the id of a node that was removed panics. Engines only hold
/// ids of live nodes.
impl<T> Index<NodeId> for BinaryTree<T> {
    type Output = Node<T>;

    fn index(&self, id: NodeId) -> &Self::Output {
        match self.nodes.get(id.idx()) {
            Some(Some(node)) => node,
            _ => panic!("node {id} is not part of the tree"),
        }
    }
}

impl<T> IndexMut<NodeId> for BinaryTree<T> {
    fn index_mut(&mut self, id: NodeId) -> &mut Self::Output {
        match self.nodes.get_mut(id.idx()) {
            Some(Some(node)) => node,
            _ => panic!("node {id} is not part of the tree"),
        }
    }
}

impl<T: NodeTag> BinaryTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, id: NodeId) -> Option<&Node<T>> {
        self.nodes.get(id.idx()).and_then(Option::as_ref)
    }

    pub fn contains_id(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Live nodes in id order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node<T>)> + '_ {
        self.nodes.iter().enumerate().filter_map(|(idx, slot)| {
            slot.as_ref()
                .map(|node| (NodeId::from_raw(idx as u32), node))
        })
    }

    fn alloc(&mut self, key: i64, tag: T, parent: Option<NodeId>) -> NodeId {
        let id = NodeId::from_raw(self.nodes.len() as u32);
        self.nodes.push(Some(Node {
            key,
            left: None,
            right: None,
            parent,
            tag,
        }));
        self.len += 1;
        id
    }

    /// Side of `id` under its parent, `None` for the root.
    pub fn side_of(&self, id: NodeId) -> Option<Side> {
        let parent = self[id].parent?;
        if self[parent].left == Some(id) {
            Some(Side::Left)
        } else {
            Some(Side::Right)
        }
    }

    /// Walks from the root towards `key`, emitting a `compare` per visited
    /// node and a `descend` per edge taken. A matching key ends the walk with
    /// an `Equal` compare.
    pub fn descend(&self, key: i64, recorder: &mut TraceRecorder) -> Descent {
        let Some(mut current) = self.root else {
            return Descent::Vacant {
                parent: None,
                side: Side::Left,
            };
        };

        loop {
            let node = &self[current];
            let ordering = key.cmp(&node.key);
            recorder.emit(
                EventKind::Compare,
                vec![current.into()],
                vec![AttributeChange::set(
                    Attribute::Ordering,
                    AttrValue::Outcome(Outcome::from(ordering)),
                )],
            );

            let side = match ordering {
                Ordering::Equal => return Descent::Found(current),
                Ordering::Less => Side::Left,
                Ordering::Greater => Side::Right,
            };

            match node.child(side) {
                Some(next) => {
                    recorder.emit(
                        EventKind::Descend,
                        vec![current.into(), next.into()],
                        vec![AttributeChange::set(Attribute::Side, AttrValue::Side(side))],
                    );
                    current = next;
                }
                None => {
                    return Descent::Vacant {
                        parent: Some(current),
                        side,
                    }
                }
            }
        }
    }

    /// Hangs a new node at a vacant position found by [`Self::descend`].
    /// `extra` is appended to the attach event (e.g. the initial color).
    pub fn attach(
        &mut self,
        parent: Option<NodeId>,
        side: Side,
        key: i64,
        tag: T,
        extra: Vec<AttributeChange>,
        recorder: &mut TraceRecorder,
    ) -> NodeId {
        let id = self.alloc(key, tag, parent);
        let mut subjects = Vec::with_capacity(2);
        let mut changes = vec![AttributeChange::set(Attribute::Key, AttrValue::Int(key))];

        match parent {
            Some(parent) => {
                *self[parent].child_mut(side) = Some(id);
                subjects.push(parent.into());
                changes.push(AttributeChange::set(Attribute::Side, AttrValue::Side(side)));
            }
            None => self.root = Some(id),
        }
        subjects.push(id.into());
        changes.extend(extra);

        recorder.emit(EventKind::Attach, subjects, changes);
        id
    }

    /// Left rotation around `pivot`; returns the new subtree root.
    ///
    /// ```text
    ///     p                c
    ///    / \              / \
    ///   a   c     =>     p   z
    ///      / \          / \
    ///     y   z        a   y
    /// ```
    ///
    /// A pivot without a right child is left alone and `pivot` is returned
    /// without recording anything.
    pub fn rotate_left(&mut self, pivot: NodeId, recorder: &mut TraceRecorder) -> NodeId {
        let Some(child) = self[pivot].right else {
            return pivot;
        };
        recorder.emit(
            EventKind::RotateLeft,
            vec![pivot.into(), child.into()],
            Vec::new(),
        );
        self.rotate(pivot, child, Side::Left);
        child
    }

    /// Mirror image of [`Self::rotate_left`].
    pub fn rotate_right(&mut self, pivot: NodeId, recorder: &mut TraceRecorder) -> NodeId {
        let Some(child) = self[pivot].left else {
            return pivot;
        };
        recorder.emit(
            EventKind::RotateRight,
            vec![pivot.into(), child.into()],
            Vec::new(),
        );
        self.rotate(pivot, child, Side::Right);
        child
    }

    /// `direction` is the side the pivot moves towards.
    fn rotate(&mut self, pivot: NodeId, child: NodeId, direction: Side) {
        let inner = self[child].child(direction);
        let parent = self[pivot].parent;
        let pivot_side = self.side_of(pivot);

        *self[pivot].child_mut(direction.opposite()) = inner;
        if let Some(inner) = inner {
            self[inner].parent = Some(pivot);
        }

        *self[child].child_mut(direction) = Some(pivot);
        self[pivot].parent = Some(child);
        self[child].parent = parent;

        match (parent, pivot_side) {
            (Some(parent), Some(side)) => *self[parent].child_mut(side) = Some(child),
            _ => self.root = Some(child),
        }
    }

    /// Removes a node that has at most one child, lifting that child into its
    /// place. Returns the former parent.
    pub fn splice_out(&mut self, id: NodeId, recorder: &mut TraceRecorder) -> Option<NodeId> {
        let node = &self[id];
        debug_assert!(
            node.left.is_none() || node.right.is_none(),
            "only nodes with at most one child can be spliced out"
        );
        let key = node.key;
        let parent = node.parent;
        let lifted = node.left.or(node.right);

        let mut subjects: Vec<SubjectId> = vec![id.into()];
        if let Some(parent) = parent {
            subjects.push(parent.into());
        }
        recorder.emit(
            EventKind::Detach,
            subjects,
            vec![AttributeChange::clear(Attribute::Key, AttrValue::Int(key))],
        );

        if let Some(lifted) = lifted {
            self[lifted].parent = parent;
        }
        match parent {
            Some(parent) => {
                if self[parent].left == Some(id) {
                    self[parent].left = lifted;
                } else {
                    self[parent].right = lifted;
                }
            }
            None => self.root = lifted,
        }

        self.nodes[id.idx()] = None;
        self.len -= 1;
        parent
    }

    /// Gives `id` a new key without moving it.
    pub fn replace_key(&mut self, id: NodeId, key: i64, recorder: &mut TraceRecorder) {
        let before = self[id].key;
        recorder.emit(
            EventKind::Replace,
            vec![id.into()],
            vec![AttributeChange::new(
                Attribute::Key,
                AttrValue::Int(before),
                AttrValue::Int(key),
            )],
        );
        self[id].key = key;
    }

    /// Leftmost node of the subtree rooted at `id`, emitting a `descend` per
    /// step taken.
    pub fn leftmost(&self, id: NodeId, recorder: &mut TraceRecorder) -> NodeId {
        let mut current = id;
        while let Some(next) = self[current].left {
            recorder.emit(
                EventKind::Descend,
                vec![current.into(), next.into()],
                vec![AttributeChange::set(
                    Attribute::Side,
                    AttrValue::Side(Side::Left),
                )],
            );
            current = next;
        }
        current
    }

    /// Ids visited when looking for `key`, without recording anything.
    pub fn path_to(&self, key: i64) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = self.root;
        while let Some(id) = current {
            path.push(id);
            let node = &self[id];
            current = match key.cmp(&node.key) {
                Ordering::Equal => None,
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
            };
        }
        path
    }

    pub fn find(&self, key: i64) -> Option<NodeId> {
        self.path_to(key)
            .last()
            .copied()
            .filter(|id| self[*id].key == key)
    }

    pub fn in_order_keys(&self) -> Vec<i64> {
        let mut keys = Vec::with_capacity(self.len);
        let mut stack = Vec::new();
        let mut current = self.root;
        while current.is_some() || !stack.is_empty() {
            while let Some(id) = current {
                stack.push(id);
                current = self[id].left;
            }
            if let Some(id) = stack.pop() {
                keys.push(self[id].key);
                current = self[id].right;
            }
        }
        keys
    }

    /// Keys strictly increase in order, i.e. the search-tree ordering holds.
    pub fn is_search_ordered(&self) -> bool {
        self.in_order_keys().windows(2).all(|pair| pair[0] < pair[1])
    }

    /// Parent links agree with child links everywhere.
    pub fn links_consistent(&self) -> bool {
        if let Some(root) = self.root {
            if self[root].parent.is_some() {
                return false;
            }
        }
        self.iter().all(|(id, node)| {
            [node.left, node.right]
                .into_iter()
                .flatten()
                .all(|child| self.get(child).map(|c| c.parent) == Some(Some(id)))
        })
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        self.height_of(self.root)
    }

    pub fn height_of(&self, id: Option<NodeId>) -> usize {
        match id {
            None => 0,
            Some(id) => {
                let node = &self[id];
                1 + self.height_of(node.left).max(self.height_of(node.right))
            }
        }
    }

    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self[id].parent;
        while let Some(parent) = current {
            depth += 1;
            current = self[parent].parent;
        }
        depth
    }

    pub fn shape(&self) -> Shape {
        Shape {
            height: self.height(),
            nodes: self.len,
            leaves: self.iter().filter(|(_, node)| node.is_leaf()).count(),
            full: self.is_full(),
            complete: self.is_complete(),
            perfect: self.is_perfect(),
            height_balanced: self.is_height_balanced(),
        }
    }

    /// Every node has zero or two children.
    pub fn is_full(&self) -> bool {
        self.iter()
            .all(|(_, node)| node.left.is_some() == node.right.is_some())
    }

    /// Every level is filled except possibly the last, which fills from the
    /// left.
    pub fn is_complete(&self) -> bool {
        let mut queue = VecDeque::new();
        queue.push_back(self.root);
        let mut seen_gap = false;
        while let Some(slot) = queue.pop_front() {
            match slot {
                None => seen_gap = true,
                Some(id) => {
                    if seen_gap {
                        return false;
                    }
                    queue.push_back(self[id].left);
                    queue.push_back(self[id].right);
                }
            }
        }
        true
    }

    /// Full, with all leaves on the same level.
    pub fn is_perfect(&self) -> bool {
        let height = self.height() as u32;
        1usize
            .checked_shl(height)
            .map(|capacity| capacity - 1)
            == Some(self.len)
    }

    /// Sibling subtree heights differ by at most one at every node.
    pub fn is_height_balanced(&self) -> bool {
        self.balanced_height(self.root).is_some()
    }

    fn balanced_height(&self, id: Option<NodeId>) -> Option<usize> {
        let Some(id) = id else {
            return Some(0);
        };
        let left = self.balanced_height(self[id].left)?;
        let right = self.balanced_height(self[id].right)?;
        (left.abs_diff(right) <= 1).then_some(1 + left.max(right))
    }
}

impl<T: NodeTag + Default> BinaryTree<T> {
    /// Builds a plain binary tree where `values[i]` has children
    /// `values[2i + 1]` and `values[2i + 2]`.
    pub fn from_level_order(values: &[i64], recorder: &mut TraceRecorder) -> Self {
        let mut tree = Self::new();
        let mut ids: Vec<NodeId> = Vec::with_capacity(values.len());
        for (index, value) in values.iter().enumerate() {
            let (parent, side) = if index == 0 {
                (None, Side::Left)
            } else {
                let side = if index % 2 == 1 { Side::Left } else { Side::Right };
                (Some(ids[(index - 1) / 2]), side)
            };
            let id = tree.attach(parent, side, *value, T::default(), Vec::new(), recorder);
            ids.push(id);
        }
        tree
    }
}

/// Summary statistics for a binary tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub height: usize,
    pub nodes: usize,
    pub leaves: usize,
    pub full: bool,
    pub complete: bool,
    pub perfect: bool,
    pub height_balanced: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level_order(values: &[i64]) -> BinaryTree<()> {
        BinaryTree::from_level_order(values, &mut TraceRecorder::new())
    }

    fn insert(tree: &mut BinaryTree<()>, key: i64, recorder: &mut TraceRecorder) {
        if let Descent::Vacant { parent, side } = tree.descend(key, recorder) {
            tree.attach(parent, side, key, (), Vec::new(), recorder);
        }
    }

    #[test]
    fn level_order_tree_is_perfect() {
        let mut recorder = TraceRecorder::new();
        let tree: BinaryTree<()> =
            BinaryTree::from_level_order(&[1, 2, 3, 4, 5, 6, 7], &mut recorder);
        let shape = tree.shape();

        assert_eq!(shape.height, 3);
        assert_eq!(shape.nodes, 7);
        assert_eq!(shape.leaves, 4);
        assert!(shape.full && shape.complete && shape.perfect && shape.height_balanced);
        assert_eq!(recorder.take().count(EventKind::Attach), 7);

        let root = tree.root().unwrap();
        assert_eq!(tree.depth(root), 0);
        assert!(tree
            .iter()
            .filter(|(_, node)| node.is_leaf())
            .all(|(id, _)| tree.depth(id) == 2));
    }

    #[test]
    fn classifies_partial_shapes() {
        let complete = level_order(&[1, 2, 3, 4]);
        assert!(complete.is_complete());
        assert!(!complete.is_full());
        assert!(!complete.is_perfect());

        let full = level_order(&[1, 2, 3, 4, 5]);
        assert!(full.is_full());
        assert!(full.is_complete());

        let mut recorder = TraceRecorder::new();
        let mut chain = BinaryTree::new();
        for key in [1, 2, 3] {
            insert(&mut chain, key, &mut recorder);
        }
        assert!(!chain.is_height_balanced());
        assert!(!chain.is_complete());
    }

    #[test]
    fn descend_reports_duplicates_with_equal_compare() {
        let mut recorder = TraceRecorder::new();
        let mut tree = BinaryTree::new();
        for key in [50, 30, 70] {
            insert(&mut tree, key, &mut recorder);
        }
        recorder.take();

        let found = tree.descend(30, &mut recorder);
        let trace = recorder.take();
        assert!(matches!(found, Descent::Found(_)));
        assert_eq!(
            trace.kinds(),
            vec![EventKind::Compare, EventKind::Descend, EventKind::Compare]
        );
        let last = trace.last().unwrap();
        assert_eq!(
            last.change(Attribute::Ordering).unwrap().after,
            AttrValue::Outcome(Outcome::Equal)
        );
    }

    #[test]
    fn rotations_preserve_order_and_links() {
        let mut recorder = TraceRecorder::new();
        let mut tree = BinaryTree::new();
        for key in [10, 5, 20, 15, 30] {
            insert(&mut tree, key, &mut recorder);
        }
        let root = tree.root().unwrap();

        let new_root = tree.rotate_left(root, &mut recorder);
        assert_eq!(tree[new_root].key, 20);
        assert_eq!(tree.root(), Some(new_root));
        assert!(tree.is_search_ordered());
        assert!(tree.links_consistent());

        tree.rotate_right(new_root, &mut recorder);
        assert_eq!(tree[tree.root().unwrap()].key, 10);
        assert!(tree.links_consistent());
        assert_eq!(tree.in_order_keys(), vec![5, 10, 15, 20, 30]);
    }

    #[test]
    fn rotation_without_a_child_is_a_no_op() {
        let mut recorder = TraceRecorder::new();
        let mut tree = BinaryTree::new();
        for key in [10, 5] {
            insert(&mut tree, key, &mut recorder);
        }
        recorder.take();
        let root = tree.root().unwrap();

        assert_eq!(tree.rotate_left(root, &mut recorder), root);
        assert!(recorder.take().is_empty());
        assert_eq!(tree.root(), Some(root));
        assert_eq!(tree.in_order_keys(), vec![5, 10]);

        let five = tree.find(5).unwrap();
        assert_eq!(tree.rotate_right(five, &mut recorder), five);
        assert_eq!(recorder.pending(), 0);
        assert!(tree.links_consistent());
    }

    #[test]
    fn splice_out_lifts_single_child() {
        let mut recorder = TraceRecorder::new();
        let mut tree = BinaryTree::new();
        for key in [50, 30, 20, 25] {
            insert(&mut tree, key, &mut recorder);
        }
        let twenty = tree.find(20).unwrap();
        let parent = tree.splice_out(twenty, &mut recorder);

        assert_eq!(parent.map(|id| tree[id].key), Some(30));
        assert_eq!(tree.in_order_keys(), vec![25, 30, 50]);
        assert!(tree.links_consistent());
        assert!(!tree.contains_id(twenty));
        assert_eq!(tree.len(), 3);
    }
}
