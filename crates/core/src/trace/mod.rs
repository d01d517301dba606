//! Trace events emitted by the engines and the recorder that orders them.
//!
//! Every mutation produces a [`Trace`]: an ordered, finite list of
//! [`TraceEvent`]s. Ordinals come from a single clock per recorder and are
//! never reused, so a renderer can merge traces from consecutive operations
//! without re-sorting.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{hull::PointId, hull::PointRole, tree::Color, tree::NodeId, tree::Side};

/// Closed set of state changes a renderer has to understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Compare,
    Descend,
    Attach,
    Recolor,
    RotateLeft,
    RotateRight,
    Split,
    Promote,
    Swap,
    BubbleUp,
    BubbleDown,
    MarkPruned,
    MarkHull,
    /// A node leaves the structure; its single child (if any) takes its place.
    Detach,
    /// A node keeps its identity but takes over another key.
    Replace,
    /// AVL balance factor moved.
    Rebalance,
    MarkExtreme,
    MarkApex,
}

impl EventKind {
    /// Whether the event changes the shape or content of the structure, as
    /// opposed to only describing the search that led to a change.
    pub fn is_structural(self) -> bool {
        !matches!(self, Self::Compare | Self::Descend)
    }
}

/// Identifier of the thing an event talks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "kebab-case")]
pub enum SubjectId {
    Node(NodeId),
    /// Position in an array-backed heap.
    Slot(usize),
    Point(PointId),
}

impl From<NodeId> for SubjectId {
    fn from(value: NodeId) -> Self {
        Self::Node(value)
    }
}

impl From<PointId> for SubjectId {
    fn from(value: PointId) -> Self {
        Self::Point(value)
    }
}

impl SubjectId {
    pub fn as_node(self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Attribute {
    Key,
    Side,
    Color,
    Balance,
    Keys,
    Value,
    Role,
    Ordering,
    /// Child index taken while descending a B-tree.
    Child,
}

/// Result of comparing a search key against a node key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Less,
    Equal,
    Greater,
}

impl From<Ordering> for Outcome {
    fn from(value: Ordering) -> Self {
        match value {
            Ordering::Less => Self::Less,
            Ordering::Equal => Self::Equal,
            Ordering::Greater => Self::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum AttrValue {
    None,
    Int(i64),
    Keys(Vec<i64>),
    Color(Color),
    Side(Side),
    Role(PointRole),
    Outcome(Outcome),
}

impl AttrValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }
}

/// One attribute of one subject moving from `before` to `after`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub attribute: Attribute,
    pub before: AttrValue,
    pub after: AttrValue,
}

impl AttributeChange {
    pub fn new(attribute: Attribute, before: AttrValue, after: AttrValue) -> Self {
        Self {
            attribute,
            before,
            after,
        }
    }

    /// Attribute that did not exist before the event.
    pub fn set(attribute: Attribute, after: AttrValue) -> Self {
        Self::new(attribute, AttrValue::None, after)
    }

    /// Attribute that no longer exists after the event.
    pub fn clear(attribute: Attribute, before: AttrValue) -> Self {
        Self::new(attribute, before, AttrValue::None)
    }
}

/// Flat record handed to the renderer.
///
/// When an event changes the same attribute on several subjects, the changes
/// are listed in subject order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub kind: EventKind,
    #[serde(rename = "subjectIds")]
    pub subjects: Vec<SubjectId>,
    #[serde(rename = "attributeChanges")]
    pub changes: Vec<AttributeChange>,
    #[serde(rename = "timestampOrdinal")]
    pub ordinal: u64,
}

impl TraceEvent {
    /// Looks up the change recorded for `attribute`, if any.
    pub fn change(&self, attribute: Attribute) -> Option<&AttributeChange> {
        self.changes
            .iter()
            .find(|change| change.attribute == attribute)
    }

    pub fn node(&self, index: usize) -> Option<NodeId> {
        self.subjects.get(index).and_then(|subject| subject.as_node())
    }
}

/// Ordered events produced by a single operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace {
    events: Vec<TraceEvent>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&TraceEvent> {
        self.events.last()
    }

    /// Number of events of the given kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|event| event.kind == kind).count()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.iter().map(|event| event.kind).collect()
    }

    /// True when ordinals are strictly increasing.
    pub fn is_ordered(&self) -> bool {
        self.events
            .windows(2)
            .all(|pair| pair[0].ordinal < pair[1].ordinal)
    }

    /// Appends the events of a later trace.
    pub fn extend(&mut self, later: Trace) {
        self.events.extend(later.events);
    }
}

impl IntoIterator for Trace {
    type Item = TraceEvent;
    type IntoIter = std::vec::IntoIter<TraceEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a Trace {
    type Item = &'a TraceEvent;
    type IntoIter = std::slice::Iter<'a, TraceEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Value returned by every traced operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Traced<T> {
    pub value: T,
    pub trace: Trace,
}

impl<T> Traced<T> {
    pub fn new(value: T, trace: Trace) -> Self {
        Self { value, trace }
    }

    pub fn into_parts(self) -> (T, Trace) {
        (self.value, self.trace)
    }
}

/// Buffers events for the operation in progress and stamps them with ordinals.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    next_ordinal: u64,
    pending: Vec<TraceEvent>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one event and returns its ordinal.
    pub fn emit(
        &mut self,
        kind: EventKind,
        subjects: Vec<SubjectId>,
        changes: Vec<AttributeChange>,
    ) -> u64 {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.pending.push(TraceEvent {
            kind,
            subjects,
            changes,
            ordinal,
        });
        ordinal
    }

    /// Ordinal the next emitted event will receive.
    pub fn next_ordinal(&self) -> u64 {
        self.next_ordinal
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Hands the buffered events over as a finished trace. The clock keeps
    /// running.
    pub fn take(&mut self) -> Trace {
        Trace {
            events: std::mem::take(&mut self.pending),
        }
    }

    /// Wraps `value` together with the buffered events.
    pub fn finish<T>(&mut self, value: T) -> Traced<T> {
        Traced::new(value, self.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u32) -> SubjectId {
        SubjectId::Node(NodeId::from_raw(id))
    }

    #[test]
    fn ordinals_keep_running_across_takes() {
        let mut recorder = TraceRecorder::new();
        recorder.emit(EventKind::Compare, vec![node(0)], Vec::new());
        recorder.emit(EventKind::Attach, vec![node(0), node(1)], Vec::new());
        let first = recorder.take();

        recorder.emit(EventKind::Recolor, vec![node(1)], Vec::new());
        let second = recorder.take();

        assert_eq!(first.len(), 2);
        assert!(first.is_ordered());
        assert_eq!(second.events()[0].ordinal, 2);
        assert_eq!(recorder.pending(), 0);
        assert_eq!(recorder.next_ordinal(), 3);
    }

    #[test]
    fn serialises_as_flat_records() {
        let mut recorder = TraceRecorder::new();
        recorder.emit(
            EventKind::RotateLeft,
            vec![node(3), node(4)],
            vec![AttributeChange::new(
                Attribute::Color,
                AttrValue::Color(Color::Red),
                AttrValue::Color(Color::Black),
            )],
        );
        let trace = recorder.take();
        let json = serde_json::to_value(&trace).unwrap();

        let event = &json[0];
        assert_eq!(event["kind"], "rotate-left");
        assert_eq!(event["subjectIds"][0]["type"], "node");
        assert_eq!(event["subjectIds"][1]["id"], 4);
        assert_eq!(event["attributeChanges"][0]["attribute"], "color");
        assert_eq!(event["attributeChanges"][0]["after"]["value"], "black");
        assert_eq!(event["timestampOrdinal"], 0);
    }

    #[test]
    fn counts_kinds() {
        let mut recorder = TraceRecorder::new();
        recorder.emit(EventKind::Swap, vec![SubjectId::Slot(0)], Vec::new());
        recorder.emit(EventKind::BubbleDown, vec![SubjectId::Slot(0)], Vec::new());
        recorder.emit(EventKind::BubbleDown, vec![SubjectId::Slot(1)], Vec::new());
        let trace = recorder.finish(()).trace;

        assert_eq!(trace.count(EventKind::BubbleDown), 2);
        assert_eq!(
            trace.kinds(),
            vec![EventKind::Swap, EventKind::BubbleDown, EventKind::BubbleDown]
        );
        assert!(!EventKind::Descend.is_structural());
        assert!(EventKind::Split.is_structural());
    }
}
