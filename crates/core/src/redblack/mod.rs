use crate::{
    config::KeyBounds,
    snapshot::TreeSnapshot,
    trace::{AttrValue, AttributeChange, Attribute, EventKind, Traced, TraceRecorder},
    tree::{BinaryTree, Color, Descent, InsertOutcome, KeyedEngine, NodeId, Side},
    Result,
};

/// Red-black tree with insertion fixup.
#[derive(Debug, Default)]
pub struct RedBlackTree {
    tree: BinaryTree<Color>,
    recorder: TraceRecorder,
    bounds: KeyBounds,
}

impl RedBlackTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(bounds: KeyBounds) -> Self {
        Self {
            bounds,
            ..Self::default()
        }
    }

    pub fn tree(&self) -> &BinaryTree<Color> {
        &self.tree
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot::capture(&self.tree)
    }

    /// Color of a live node; absent children count as black.
    pub fn color(&self, id: Option<NodeId>) -> Color {
        id.map(|id| self.tree[id].tag).unwrap_or(Color::Black)
    }

    /// Number of black nodes on every root-to-leaf path, or `None` when the
    /// red-black rules are broken anywhere.
    pub fn black_height(&self) -> Option<usize> {
        if self.color(self.tree.root()) == Color::Red {
            return None;
        }
        self.subtree_black_height(self.tree.root())
    }

    fn subtree_black_height(&self, id: Option<NodeId>) -> Option<usize> {
        let Some(id) = id else {
            return Some(0);
        };
        let node = &self.tree[id];
        if node.tag == Color::Red
            && (self.color(node.left) == Color::Red || self.color(node.right) == Color::Red)
        {
            return None;
        }
        let left = self.subtree_black_height(node.left)?;
        let right = self.subtree_black_height(node.right)?;
        (left == right).then_some(left + usize::from(node.tag == Color::Black))
    }

    fn recolor(&mut self, id: NodeId, color: Color) {
        let before = self.tree[id].tag;
        if before == color {
            return;
        }
        self.recorder.emit(
            EventKind::Recolor,
            vec![id.into()],
            vec![AttributeChange::new(
                Attribute::Color,
                AttrValue::Color(before),
                AttrValue::Color(color),
            )],
        );
        self.tree[id].tag = color;
    }

    /// Restores the red-black rules after `node` was attached red. Every pass
    /// either moves two levels up the tree or ends with rotations, so the
    /// loop runs at most height / 2 times.
    fn fix_insert(&mut self, mut node: NodeId) {
        while let Some(parent) = self.tree[node].parent {
            if self.tree[parent].tag == Color::Black {
                break;
            }
            // a red parent is never the root, so it has a parent of its own
            let Some(grand) = self.tree[parent].parent else {
                break;
            };
            let parent_side = self.tree.side_of(parent).unwrap_or(Side::Left);
            let uncle = self.tree[grand].child(parent_side.opposite());

            if self.color(uncle) == Color::Red {
                self.recolor(parent, Color::Black);
                if let Some(uncle) = uncle {
                    self.recolor(uncle, Color::Black);
                }
                self.recolor(grand, Color::Red);
                node = grand;
                continue;
            }

            let mut top = parent;
            if self.tree.side_of(node) == Some(parent_side.opposite()) {
                top = self.rotate(parent, parent_side);
            }
            self.recolor(top, Color::Black);
            self.recolor(grand, Color::Red);
            self.rotate(grand, parent_side.opposite());
            break;
        }

        if let Some(root) = self.tree.root() {
            self.recolor(root, Color::Black);
        }
    }

    /// Rotates `pivot` down towards `direction`.
    fn rotate(&mut self, pivot: NodeId, direction: Side) -> NodeId {
        match direction {
            Side::Left => self.tree.rotate_left(pivot, &mut self.recorder),
            Side::Right => self.tree.rotate_right(pivot, &mut self.recorder),
        }
    }
}

impl KeyedEngine for RedBlackTree {
    fn name(&self) -> &'static str {
        "red-black"
    }

    fn len(&self) -> usize {
        self.tree.len()
    }

    fn insert(&mut self, key: i64) -> Result<Traced<InsertOutcome>> {
        self.bounds.check(key)?;
        let outcome = match self.tree.descend(key, &mut self.recorder) {
            Descent::Found(id) => InsertOutcome::Duplicate(id),
            Descent::Vacant { parent, side } => {
                let id = self.tree.attach(
                    parent,
                    side,
                    key,
                    Color::Red,
                    vec![AttributeChange::set(
                        Attribute::Color,
                        AttrValue::Color(Color::Red),
                    )],
                    &mut self.recorder,
                );
                self.fix_insert(id);
                InsertOutcome::Inserted(id)
            }
        };
        let traced = self.recorder.finish(outcome);
        tracing::debug!(key, ?outcome, events = traced.trace.len(), "red-black insert");
        Ok(traced)
    }

    fn search(&mut self, key: i64) -> Traced<Option<NodeId>> {
        let found = match self.tree.descend(key, &mut self.recorder) {
            Descent::Found(id) => Some(id),
            Descent::Vacant { .. } => None,
        };
        self.recorder.finish(found)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

    use super::*;

    fn build(keys: &[i64]) -> RedBlackTree {
        let mut tree = RedBlackTree::new();
        for key in keys {
            tree.insert(*key).unwrap();
        }
        tree
    }

    #[test]
    fn ascending_triple_rotates_once_around_the_middle_key() {
        let mut rb = build(&[10, 20]);
        let traced = rb.insert(30).unwrap();

        let root = rb.tree().root().unwrap();
        assert_eq!(rb.tree()[root].key, 20);
        assert_eq!(rb.tree()[root].tag, Color::Black);
        assert_eq!(traced.trace.count(EventKind::RotateLeft), 1);
        assert_eq!(traced.trace.count(EventKind::RotateRight), 0);
        assert_eq!(
            traced.trace.kinds()[4..].to_vec(),
            vec![EventKind::Recolor, EventKind::Recolor, EventKind::RotateLeft]
        );
        assert_eq!(rb.black_height(), Some(1));
    }

    #[test]
    fn scene_sequence_stays_valid() {
        let mut rb = RedBlackTree::new();
        for key in [7, 3, 18, 10, 22, 8, 11, 26] {
            rb.insert(key).unwrap();
            assert!(rb.black_height().is_some());
            assert!(rb.tree().is_search_ordered());
            assert!(rb.tree().links_consistent());
        }
        let root = rb.tree().root().unwrap();
        assert_eq!(rb.tree()[root].key, 7);
        assert_eq!(rb.black_height(), Some(2));
    }

    #[test]
    fn random_inserts_keep_invariants_and_replay() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let mut keys: Vec<i64> = (0..120).collect();
            keys.shuffle(&mut rng);

            let mut rb = RedBlackTree::new();
            for key in keys.iter().take(60) {
                let mut mirror = rb.snapshot();
                let traced = rb.insert(*key).unwrap();
                mirror.replay(&traced.trace).unwrap();

                assert_eq!(mirror, rb.snapshot());
                assert!(rb.black_height().is_some());
                assert!(rb.tree().is_search_ordered());
            }
            let height = rb.tree().height();
            assert!(height <= 2 * (usize::BITS - rb.len().leading_zeros()) as usize);
        }
    }

    #[test]
    fn duplicate_leaves_tree_untouched() {
        let mut rb = build(&[7, 3, 18]);
        let before = rb.snapshot();
        let traced = rb.insert(18).unwrap();

        assert!(!traced.value.is_inserted());
        assert_eq!(traced.trace.last().unwrap().kind, EventKind::Compare);
        assert_eq!(rb.snapshot(), before);
    }

    #[test]
    fn default_tree_takes_large_keys() {
        let mut rb = RedBlackTree::new();
        let traced = rb.insert(1000).unwrap();
        assert!(traced.value.is_inserted());
        assert!(rb.insert(-1).is_err());
        assert_eq!(rb.len(), 1);
    }

    #[test]
    fn deletion_is_not_offered() {
        let mut rb = build(&[1]);
        assert!(matches!(
            rb.delete(1),
            Err(crate::AlgoVizError::Unsupported(_))
        ));
    }
}
