use serde::{Deserialize, Serialize};

use crate::{
    bst::{delete_case, remove_node},
    config::KeyBounds,
    snapshot::TreeSnapshot,
    trace::{AttrValue, AttributeChange, Attribute, EventKind, Traced, TraceRecorder},
    tree::{BinaryTree, DeleteCase, Descent, InsertOutcome, KeyedEngine, NodeId, NodeTag, Side},
    Result,
};

/// Height and balance factor cached on every AVL node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvlTag {
    pub height: i32,
    /// `height(left) - height(right)`.
    pub balance: i32,
}

impl Default for AvlTag {
    fn default() -> Self {
        Self {
            height: 1,
            balance: 0,
        }
    }
}

impl NodeTag for AvlTag {}

/// Which imbalance triggered a rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationCase {
    LL,
    RR,
    LR,
    RL,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationInfo {
    /// The unbalanced node.
    pub pivot: NodeId,
    pub child: NodeId,
    /// Set for the double-rotation cases.
    pub grandchild: Option<NodeId>,
    pub case: RotationCase,
}

/// Height-balanced search tree.
#[derive(Debug, Default)]
pub struct AvlTree {
    tree: BinaryTree<AvlTag>,
    recorder: TraceRecorder,
    bounds: KeyBounds,
    last_rotation: Option<RotationInfo>,
}

impl AvlTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(bounds: KeyBounds) -> Self {
        Self {
            bounds,
            ..Self::default()
        }
    }

    pub fn tree(&self) -> &BinaryTree<AvlTag> {
        &self.tree
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot::capture(&self.tree)
    }

    /// First rotation performed by the most recent insert or delete.
    pub fn last_rotation(&self) -> Option<RotationInfo> {
        self.last_rotation
    }

    /// Height of the tree, `0` when empty.
    pub fn height(&self) -> i32 {
        self.cached_height(self.tree.root())
    }

    /// Every node is within one level of balance and its cached height and
    /// balance factor match the actual subtrees.
    pub fn is_balanced(&self) -> bool {
        self.tree.iter().all(|(_, node)| {
            let left = self.tree.height_of(node.left) as i32;
            let right = self.tree.height_of(node.right) as i32;
            node.tag.balance == left - right
                && node.tag.height == 1 + left.max(right)
                && (-1..=1).contains(&node.tag.balance)
        })
    }

    fn cached_height(&self, id: Option<NodeId>) -> i32 {
        id.map(|id| self.tree[id].tag.height).unwrap_or(0)
    }

    /// Recomputes the cached height and balance of `id`, recording a
    /// `rebalance` event when the balance factor moves.
    fn refresh(&mut self, id: NodeId) {
        let left = self.cached_height(self.tree[id].left);
        let right = self.cached_height(self.tree[id].right);
        let before = self.tree[id].tag.balance;
        let tag = AvlTag {
            height: 1 + left.max(right),
            balance: left - right,
        };
        self.tree[id].tag = tag;

        if before != tag.balance {
            self.recorder.emit(
                EventKind::Rebalance,
                vec![id.into()],
                vec![AttributeChange::new(
                    Attribute::Balance,
                    AttrValue::Int(i64::from(before)),
                    AttrValue::Int(i64::from(tag.balance)),
                )],
            );
        }
    }

    /// Rotates `pivot` down towards `direction` and refreshes both nodes
    /// whose subtrees changed.
    fn rotate(&mut self, pivot: NodeId, direction: Side) -> NodeId {
        let top = match direction {
            Side::Left => self.tree.rotate_left(pivot, &mut self.recorder),
            Side::Right => self.tree.rotate_right(pivot, &mut self.recorder),
        };
        self.refresh(pivot);
        self.refresh(top);
        top
    }

    /// Walks from `start` to the root, refreshing heights and rotating any node
    /// whose balance left `-1..=1`. One step per ancestor, so the walk is
    /// bounded by the tree height.
    fn rebalance_from(&mut self, start: Option<NodeId>) {
        self.last_rotation = None;
        let mut current = start;

        while let Some(id) = current {
            self.refresh(id);
            let balance = self.tree[id].tag.balance;
            let mut top = id;

            if balance > 1 {
                if let Some(child) = self.tree[id].left {
                    let inner = self.tree[child].tag.balance < 0;
                    self.note_rotation(id, child, inner, Side::Left);
                    if inner {
                        self.rotate(child, Side::Left);
                    }
                    top = self.rotate(id, Side::Right);
                }
            } else if balance < -1 {
                if let Some(child) = self.tree[id].right {
                    let inner = self.tree[child].tag.balance > 0;
                    self.note_rotation(id, child, inner, Side::Right);
                    if inner {
                        self.rotate(child, Side::Right);
                    }
                    top = self.rotate(id, Side::Left);
                }
            }

            current = self.tree[top].parent;
        }
    }

    fn note_rotation(&mut self, pivot: NodeId, child: NodeId, inner: bool, heavy: Side) {
        if self.last_rotation.is_some() {
            return;
        }
        let grandchild = inner
            .then(|| self.tree[child].child(heavy.opposite()))
            .flatten();
        let case = match (heavy, inner) {
            (Side::Left, false) => RotationCase::LL,
            (Side::Left, true) => RotationCase::LR,
            (Side::Right, false) => RotationCase::RR,
            (Side::Right, true) => RotationCase::RL,
        };
        self.last_rotation = Some(RotationInfo {
            pivot,
            child,
            grandchild,
            case,
        });
    }
}

impl KeyedEngine for AvlTree {
    fn name(&self) -> &'static str {
        "avl"
    }

    fn len(&self) -> usize {
        self.tree.len()
    }

    fn insert(&mut self, key: i64) -> Result<Traced<InsertOutcome>> {
        self.bounds.check(key)?;
        self.last_rotation = None;
        let outcome = match self.tree.descend(key, &mut self.recorder) {
            Descent::Found(id) => InsertOutcome::Duplicate(id),
            Descent::Vacant { parent, side } => {
                let id = self.tree.attach(
                    parent,
                    side,
                    key,
                    AvlTag::default(),
                    vec![AttributeChange::set(Attribute::Balance, AttrValue::Int(0))],
                    &mut self.recorder,
                );
                self.rebalance_from(parent);
                InsertOutcome::Inserted(id)
            }
        };
        let traced = self.recorder.finish(outcome);
        tracing::debug!(
            key,
            ?outcome,
            rotation = ?self.last_rotation.map(|info| info.case),
            events = traced.trace.len(),
            "avl insert"
        );
        Ok(traced)
    }

    fn search(&mut self, key: i64) -> Traced<Option<NodeId>> {
        let found = match self.tree.descend(key, &mut self.recorder) {
            Descent::Found(id) => Some(id),
            Descent::Vacant { .. } => None,
        };
        self.recorder.finish(found)
    }

    fn delete(&mut self, key: i64) -> Result<Traced<DeleteCase>> {
        self.last_rotation = None;
        let case = match self.tree.descend(key, &mut self.recorder) {
            Descent::Vacant { .. } => DeleteCase::NotFound,
            Descent::Found(id) => {
                let case = delete_case(&self.tree, id);
                let parent = remove_node(&mut self.tree, id, &mut self.recorder);
                self.rebalance_from(parent);
                case
            }
        };
        let traced = self.recorder.finish(case);
        tracing::debug!(key, ?case, events = traced.trace.len(), "avl delete");
        Ok(traced)
    }
}
