use crate::{
    config::KeyBounds,
    snapshot::TreeSnapshot,
    trace::{AttrValue, AttributeChange, Attribute, EventKind, TraceRecorder, Traced},
    tree::{BinaryTree, DeleteCase, Descent, InsertOutcome, KeyedEngine, NodeId, NodeTag, Side},
    Result,
};

/// Unbalanced binary search tree.
#[derive(Debug, Default)]
pub struct Bst {
    tree: BinaryTree<()>,
    recorder: TraceRecorder,
    bounds: KeyBounds,
}

impl Bst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(bounds: KeyBounds) -> Self {
        Self {
            bounds,
            ..Self::default()
        }
    }

    pub fn tree(&self) -> &BinaryTree<()> {
        &self.tree
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot::capture(&self.tree)
    }

    /// Reports which deletion case `key` would hit, without recording or
    /// changing anything.
    pub fn classify_delete(&self, key: i64) -> (Option<NodeId>, DeleteCase) {
        match self.tree.find(key) {
            None => (None, DeleteCase::NotFound),
            Some(id) => (Some(id), delete_case(&self.tree, id)),
        }
    }

    /// Path from the root to the node where `key` is or would be attached.
    pub fn insertion_path(&self, key: i64) -> Vec<NodeId> {
        self.tree.path_to(key)
    }
}

impl KeyedEngine for Bst {
    fn name(&self) -> &'static str {
        "bst"
    }

    fn len(&self) -> usize {
        self.tree.len()
    }

    fn insert(&mut self, key: i64) -> Result<Traced<InsertOutcome>> {
        self.bounds.check(key)?;
        let outcome = match self.tree.descend(key, &mut self.recorder) {
            Descent::Found(id) => InsertOutcome::Duplicate(id),
            Descent::Vacant { parent, side } => InsertOutcome::Inserted(self.tree.attach(
                parent,
                side,
                key,
                (),
                Vec::new(),
                &mut self.recorder,
            )),
        };
        let traced = self.recorder.finish(outcome);
        tracing::debug!(key, ?outcome, events = traced.trace.len(), "bst insert");
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
        let case = match self.tree.descend(key, &mut self.recorder) {
            Descent::Vacant { .. } => DeleteCase::NotFound,
            Descent::Found(id) => {
                let case = delete_case(&self.tree, id);
                remove_node(&mut self.tree, id, &mut self.recorder);
                case
            }
        };
        let traced = self.recorder.finish(case);
        tracing::debug!(key, ?case, events = traced.trace.len(), "bst delete");
        Ok(traced)
    }
}

pub(crate) fn delete_case<T: NodeTag>(tree: &BinaryTree<T>, id: NodeId) -> DeleteCase {
    let node = &tree[id];
    match (node.left, node.right) {
        (None, None) => DeleteCase::Leaf,
        (Some(_), Some(_)) => DeleteCase::TwoChildren,
        _ => DeleteCase::OneChild,
    }
}

/// Removes `id` from a search tree. Nodes with two children take over the key
/// of their in-order successor, which is spliced out instead. Returns the
/// parent of the node that physically left the tree.
pub(crate) fn remove_node<T: NodeTag>(
    tree: &mut BinaryTree<T>,
    id: NodeId,
    recorder: &mut TraceRecorder,
) -> Option<NodeId> {
    let node = &tree[id];
    let Some(right) = node.right.filter(|_| node.left.is_some()) else {
        return tree.splice_out(id, recorder);
    };

    recorder.emit(
        EventKind::Descend,
        vec![id.into(), right.into()],
        vec![AttributeChange::set(
            Attribute::Side,
            AttrValue::Side(Side::Right),
        )],
    );
    let successor = tree.leftmost(right, recorder);
    let successor_key = tree[successor].key;
    tree.replace_key(id, successor_key, recorder);
    tree.splice_out(successor, recorder)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE_KEYS: [i64; 10] = [50, 30, 70, 20, 40, 60, 10, 5, 80, 25];

    fn build(keys: &[i64]) -> Bst {
        let mut bst = Bst::new();
        for key in keys {
            bst.insert(*key).unwrap();
        }
        bst
    }

    #[test]
    fn insert_keeps_search_order() {
        let bst = build(&SCENE_KEYS);
        let mut sorted = SCENE_KEYS.to_vec();
        sorted.sort_unstable();

        assert_eq!(bst.tree().in_order_keys(), sorted);
        assert!(bst.tree().links_consistent());
        assert_eq!(bst.tree().height(), 5);
    }

    #[test]
    fn insert_trace_walks_then_attaches() {
        let mut bst = build(&[50, 30, 70]);
        let traced = bst.insert(40).unwrap();

        assert!(traced.value.is_inserted());
        assert_eq!(
            traced.trace.kinds(),
            vec![
                EventKind::Compare,
                EventKind::Descend,
                EventKind::Compare,
                EventKind::Attach
            ]
        );
        let attach = traced.trace.last().unwrap();
        assert_eq!(attach.node(1), Some(traced.value.node()));
        assert_eq!(
            attach.change(Attribute::Side).unwrap().after,
            AttrValue::Side(Side::Right)
        );
    }

    #[test]
    fn duplicate_insert_is_compare_only() {
        let mut bst = build(&[50, 30, 70]);
        let before = bst.snapshot();
        let traced = bst.insert(30).unwrap();

        assert!(matches!(traced.value, InsertOutcome::Duplicate(_)));
        assert_eq!(traced.trace.last().unwrap().kind, EventKind::Compare);
        assert!(traced.trace.events().iter().all(|e| !e.kind.is_structural()));
        assert_eq!(bst.snapshot(), before);
    }

    #[test]
    fn rejects_keys_outside_bounds_without_side_effects() {
        let mut bst = Bst::with_bounds(KeyBounds::new(0, 100));
        bst.insert(10).unwrap();
        let err = bst.insert(-4).unwrap_err();

        assert!(matches!(err, crate::AlgoVizError::InvalidInput(_)));
        assert_eq!(bst.len(), 1);
        let next = bst.insert(20).unwrap();
        assert_eq!(next.trace.events()[0].ordinal, 1);
    }

    #[test]
    fn unbounded_tree_takes_negative_keys() {
        let mut bst = Bst::with_bounds(KeyBounds::unbounded());
        for key in [0, -50, 50, i64::MIN, i64::MAX] {
            assert!(bst.insert(key).unwrap().value.is_inserted());
        }
        assert_eq!(
            bst.tree().in_order_keys(),
            vec![i64::MIN, -50, 0, 50, i64::MAX]
        );
    }

    #[test]
    fn deletes_all_three_cases() {
        let mut bst = build(&SCENE_KEYS);

        assert_eq!(bst.classify_delete(5).1, DeleteCase::Leaf);
        assert_eq!(bst.delete(5).unwrap().value, DeleteCase::Leaf);
        assert_eq!(bst.delete(10).unwrap().value, DeleteCase::Leaf);
        assert_eq!(bst.delete(20).unwrap().value, DeleteCase::OneChild);

        let traced = bst.delete(30).unwrap();
        assert_eq!(traced.value, DeleteCase::TwoChildren);
        assert_eq!(traced.trace.count(EventKind::Replace), 1);
        assert_eq!(traced.trace.count(EventKind::Detach), 1);

        assert_eq!(bst.tree().in_order_keys(), vec![25, 40, 50, 60, 70, 80]);
        assert!(bst.tree().links_consistent());
        let root = bst.tree().root().unwrap();
        let left = bst.tree()[root].left.unwrap();
        assert_eq!(bst.tree()[left].key, 40);
    }

    #[test]
    fn missing_key_delete_only_searches() {
        let mut bst = build(&[50, 30]);
        let traced = bst.delete(99).unwrap();

        assert_eq!(traced.value, DeleteCase::NotFound);
        assert!(traced.trace.events().iter().all(|e| !e.kind.is_structural()));
        assert_eq!(bst.len(), 2);
    }

    #[test]
    fn search_reports_found_node() {
        let mut bst = build(&SCENE_KEYS);
        let traced = bst.search(60);

        let found = traced.value.unwrap();
        assert_eq!(bst.tree()[found].key, 60);
        assert_eq!(traced.trace.count(EventKind::Compare), 3);
        assert!(bst.search(65).value.is_none());
        assert_eq!(bst.insertion_path(65).len(), 3);
    }
}
