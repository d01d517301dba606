//! Core library for the algorithm visualiser.
//!
//! Each engine owns one classic data structure and reports every mutation as
//! an ordered [`Trace`] of discrete events, so a separate renderer can animate
//! the algorithm step by step without knowing how it works. Scenes bundle an
//! engine with its input and the recorder writes the resulting traces out.

pub mod avl;
pub mod bst;
pub mod btree;
pub mod config;
pub mod error;
pub mod heap;
pub mod hull;
pub mod record;
pub mod redblack;
pub mod scene;
pub mod snapshot;
pub mod trace;
pub mod tree;

pub use avl::{AvlTree, RotationCase, RotationInfo};
pub use bst::Bst;
pub use btree::{BTree, BTreeSnapshot};
pub use config::{AppConfig, BTreeConfig, Distribution, HeapConfig, InputConfig, KeyBounds};
pub use error::{AlgoVizError, Result};
pub use heap::{Heap, HeapKind};
pub use hull::{Baseline, Partition, Point, PointId, PointRole, QuickHull};
pub use record::{JsonSink, Recorder, RecordingSettings, TraceSink};
pub use redblack::RedBlackTree;
pub use scene::{SceneDescriptor, SceneKind, SceneOp, SceneRunner, SceneScript, SceneStep};
pub use snapshot::{diff, SnapshotDiff, TreeSnapshot};
pub use trace::{EventKind, Trace, TraceEvent, TraceRecorder, Traced};
pub use tree::{BinaryTree, Color, DeleteCase, InsertOutcome, KeyedEngine, NodeId, Side};
