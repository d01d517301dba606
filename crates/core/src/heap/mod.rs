//! Array-backed binary heap. Parent and child positions are implicit:
//! slot `i` has children `2i + 1` and `2i + 2`.

use serde::{Deserialize, Serialize};

use crate::{
    config::KeyBounds,
    trace::{AttrValue, AttributeChange, Attribute, EventKind, SubjectId, Traced, TraceRecorder},
    AlgoVizError, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeapKind {
    #[default]
    Max,
    Min,
}

impl HeapKind {
    /// Whether `a` belongs above `b`.
    pub fn dominates(self, a: i64, b: i64) -> bool {
        match self {
            Self::Max => a >= b,
            Self::Min => a <= b,
        }
    }
}

#[derive(Debug, Default)]
pub struct Heap {
    kind: HeapKind,
    values: Vec<i64>,
    recorder: TraceRecorder,
    bounds: KeyBounds,
}

impl Heap {
    pub fn new(kind: HeapKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_bounds(kind: HeapKind, bounds: KeyBounds) -> Self {
        Self {
            kind,
            bounds,
            ..Self::default()
        }
    }

    /// Builds a heap bottom-up: every value is attached in input order, then
    /// each internal slot is sifted down starting from the last one.
    pub fn from_values(kind: HeapKind, values: &[i64]) -> Result<Traced<Self>> {
        Self::from_values_with_bounds(kind, KeyBounds::default(), values)
    }

    pub fn from_values_with_bounds(
        kind: HeapKind,
        bounds: KeyBounds,
        values: &[i64],
    ) -> Result<Traced<Self>> {
        let mut heap = Self::with_bounds(kind, bounds);
        for value in values {
            heap.bounds.check(*value)?;
        }
        for value in values {
            heap.values.push(*value);
            heap.record_attach(heap.values.len() - 1, *value);
        }
        for slot in (0..heap.values.len() / 2).rev() {
            heap.bubble_down(slot);
        }
        let trace = heap.recorder.take();
        tracing::debug!(?kind, len = heap.len(), events = trace.len(), "heapified");
        Ok(Traced::new(heap, trace))
    }

    pub fn kind(&self) -> HeapKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.values
    }

    pub fn peek(&self) -> Option<i64> {
        self.values.first().copied()
    }

    /// Number of levels, `0` when empty.
    pub fn height(&self) -> usize {
        (usize::BITS - self.values.len().leading_zeros()) as usize
    }

    pub fn is_valid(&self) -> bool {
        (1..self.values.len())
            .all(|slot| self.kind.dominates(self.values[(slot - 1) / 2], self.values[slot]))
    }

    pub fn insert(&mut self, value: i64) -> Result<Traced<usize>> {
        self.bounds.check(value)?;
        self.values.push(value);
        let slot = self.bubble_up_from_attach(value);
        let traced = self.recorder.finish(slot);
        tracing::debug!(value, slot, events = traced.trace.len(), "heap insert");
        Ok(traced)
    }

    /// Removes the root. An empty heap yields `None` and an empty trace.
    pub fn extract(&mut self) -> Traced<Option<i64>> {
        if self.values.is_empty() {
            return self.recorder.finish(None);
        }

        let last = self.values.len() - 1;
        if last > 0 {
            self.swap(0, last, EventKind::Swap);
        }
        let root = self.values.pop();
        if let Some(value) = root {
            self.recorder.emit(
                EventKind::Detach,
                vec![SubjectId::Slot(last)],
                vec![AttributeChange::clear(Attribute::Value, AttrValue::Int(value))],
            );
        }
        self.bubble_down(0);

        let traced = self.recorder.finish(root);
        tracing::debug!(
            value = ?root,
            remaining = self.len(),
            events = traced.trace.len(),
            "heap extract"
        );
        traced
    }

    /// Like [`Heap::extract`], for callers that need a value.
    pub fn try_extract(&mut self) -> Result<Traced<i64>> {
        let Traced { value, trace } = self.extract();
        value
            .map(|value| Traced::new(value, trace))
            .ok_or(AlgoVizError::EmptyStructure("heap"))
    }

    fn record_attach(&mut self, slot: usize, value: i64) {
        self.recorder.emit(
            EventKind::Attach,
            vec![SubjectId::Slot(slot)],
            vec![AttributeChange::set(Attribute::Value, AttrValue::Int(value))],
        );
    }

    /// Attaches the freshly pushed value and moves it up while it dominates
    /// its parent. Returns its final slot.
    fn bubble_up_from_attach(&mut self, value: i64) -> usize {
        let mut slot = self.values.len() - 1;
        self.record_attach(slot, value);
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.kind.dominates(self.values[parent], self.values[slot]) {
                break;
            }
            self.swap(slot, parent, EventKind::BubbleUp);
            slot = parent;
        }
        slot
    }

    /// Sifts the value at `slot` down. Each step descends one level, so the
    /// number of steps is bounded by the height.
    fn bubble_down(&mut self, mut slot: usize) {
        let len = self.values.len();
        loop {
            let mut top = slot;
            for child in [2 * slot + 1, 2 * slot + 2] {
                if child < len && !self.kind.dominates(self.values[top], self.values[child]) {
                    top = child;
                }
            }
            if top == slot {
                break;
            }
            self.swap(slot, top, EventKind::BubbleDown);
            slot = top;
        }
    }

    fn swap(&mut self, a: usize, b: usize, kind: EventKind) {
        let (va, vb) = (self.values[a], self.values[b]);
        self.values.swap(a, b);
        self.recorder.emit(
            kind,
            vec![SubjectId::Slot(a), SubjectId::Slot(b)],
            vec![
                AttributeChange::new(Attribute::Value, AttrValue::Int(va), AttrValue::Int(vb)),
                AttributeChange::new(Attribute::Value, AttrValue::Int(vb), AttrValue::Int(va)),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    fn build(kind: HeapKind, values: &[i64]) -> Heap {
        let mut heap = Heap::new(kind);
        for value in values {
            heap.insert(*value).unwrap();
        }
        heap
    }

    #[test]
    fn extracts_the_maximum_first() {
        let mut heap = build(HeapKind::Max, &[5, 3, 8, 1]);
        assert_eq!(heap.peek(), Some(8));

        let traced = heap.extract();
        assert_eq!(traced.value, Some(8));
        assert!(heap.is_valid());

        let mut rest = heap.as_slice().to_vec();
        rest.sort_unstable();
        assert_eq!(rest, vec![1, 3, 5]);
        assert_eq!(heap.peek(), Some(5));
    }

    #[test]
    fn extraction_only_swaps_and_sifts_down() {
        let mut heap = build(HeapKind::Max, &[4, 10, 3, 5, 1, 8, 7]);
        let traced = heap.extract();

        assert_eq!(traced.value, Some(10));
        let kinds = traced.trace.kinds();
        assert_eq!(kinds[0], EventKind::Swap);
        assert_eq!(kinds[1], EventKind::Detach);
        assert!(kinds[2..].iter().all(|kind| *kind == EventKind::BubbleDown));
        assert!(kinds.len() - 2 < heap.height() + 1);
        assert!(heap.is_valid());
    }

    #[test]
    fn insert_bubbles_up_to_the_root() {
        let mut heap = build(HeapKind::Min, &[5, 7, 9]);
        let traced = heap.insert(1).unwrap();

        assert_eq!(traced.value, 0);
        assert_eq!(
            traced.trace.kinds(),
            vec![EventKind::Attach, EventKind::BubbleUp, EventKind::BubbleUp]
        );
        let first = &traced.trace.events()[1];
        assert_eq!(first.subjects, vec![SubjectId::Slot(3), SubjectId::Slot(1)]);
        assert_eq!(first.changes[0].after, AttrValue::Int(7));
    }

    #[test]
    fn empty_extract_is_a_no_op() {
        let mut heap = Heap::new(HeapKind::Max);
        let traced = heap.extract();
        assert_eq!(traced.value, None);
        assert!(traced.trace.is_empty());

        assert!(matches!(
            heap.try_extract(),
            Err(AlgoVizError::EmptyStructure(_))
        ));
    }

    #[test]
    fn random_sequences_drain_in_order() {
        let mut rng = StdRng::seed_from_u64(17);
        for kind in [HeapKind::Max, HeapKind::Min] {
            let values: Vec<i64> = (0..64).map(|_| rng.gen_range(0..1000)).collect();
            let Traced { value: mut heap, trace } = Heap::from_values(kind, &values).unwrap();
            assert!(heap.is_valid());
            assert_eq!(trace.count(EventKind::Attach), values.len());

            let mut drained = Vec::new();
            while let Ok(traced) = heap.try_extract() {
                assert!(heap.is_valid());
                assert!(traced.trace.count(EventKind::BubbleDown) <= heap.height());
                drained.push(traced.value);
            }

            let mut expected = values.clone();
            expected.sort_unstable();
            if kind == HeapKind::Max {
                expected.reverse();
            }
            assert_eq!(drained, expected);
        }
    }

    #[test]
    fn rejects_values_outside_bounds() {
        let mut heap = Heap::with_bounds(HeapKind::Max, KeyBounds::new(0, 10));
        assert!(heap.insert(11).is_err());
        assert!(heap.is_empty());
        assert!(Heap::from_values(HeapKind::Min, &[1, -1]).is_err());
        let capped = Heap::from_values_with_bounds(HeapKind::Max, KeyBounds::new(0, 9), &[3, 12]);
        assert!(capped.is_err());
    }

    #[test]
    fn default_heap_takes_large_values() {
        let heap = Heap::from_values(HeapKind::Max, &[5, 1000, 3]).unwrap().value;
        assert_eq!(heap.peek(), Some(1000));

        let mut heap = Heap::new(HeapKind::Min);
        heap.insert(1_000_000).unwrap();
        assert_eq!(heap.len(), 1);
    }
}
