use std::{f64::consts::TAU, fmt, str::FromStr};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    avl::AvlTree,
    bst::Bst,
    btree::BTree,
    config::{AppConfig, Distribution},
    heap::Heap,
    hull::{Point, QuickHull},
    redblack::RedBlackTree,
    trace::{Trace, TraceRecorder},
    tree::{BinaryTree, KeyedEngine},
    AlgoVizError, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SceneKind {
    BinaryTree,
    Bst,
    RedBlack,
    Avl,
    BTree,
    Heap,
    #[serde(rename = "quickhull")]
    QuickHull,
}

impl SceneKind {
    pub const ALL: [SceneKind; 7] = [
        SceneKind::BinaryTree,
        SceneKind::Bst,
        SceneKind::RedBlack,
        SceneKind::Avl,
        SceneKind::BTree,
        SceneKind::Heap,
        SceneKind::QuickHull,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::BinaryTree => "binary-tree",
            Self::Bst => "bst",
            Self::RedBlack => "red-black",
            Self::Avl => "avl",
            Self::BTree => "b-tree",
            Self::Heap => "heap",
            Self::QuickHull => "quickhull",
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            Self::BinaryTree => "level-order construction of a plain binary tree",
            Self::Bst => "search tree inserts, the three delete cases and a search",
            Self::RedBlack => "red-black inserts with recolor and rotation fixups",
            Self::Avl => "AVL inserts with single and double rotations",
            Self::BTree => "B-tree inserts with leaf splits and promotions",
            Self::Heap => "binary heap inserts followed by one extraction",
            Self::QuickHull => "QuickHull over a ring of points with interior clutter",
        }
    }
}

impl fmt::Display for SceneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SceneKind {
    type Err = AlgoVizError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| AlgoVizError::invalid(format!("unknown scene `{s}`")))
    }
}

/// One operation a scene performs against its engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "arg", rename_all = "kebab-case")]
pub enum SceneOp {
    /// Level-order construction of a plain binary tree.
    Build(Vec<i64>),
    Insert(i64),
    Delete(i64),
    Search(i64),
    Extract,
    Hull(Vec<Point>),
}

impl fmt::Display for SceneOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build(values) => write!(f, "build {} nodes", values.len()),
            Self::Insert(key) => write!(f, "insert {key}"),
            Self::Delete(key) => write!(f, "delete {key}"),
            Self::Search(key) => write!(f, "search {key}"),
            Self::Extract => f.write_str("extract"),
            Self::Hull(points) => write!(f, "hull of {} points", points.len()),
        }
    }
}

const BINARY_TREE_KEYS: [i64; 7] = [1, 2, 3, 4, 5, 6, 7];
const BST_KEYS: [i64; 10] = [50, 30, 70, 20, 40, 60, 10, 5, 80, 25];
const BST_DELETES: [i64; 4] = [5, 10, 20, 30];
const BST_SEARCH: i64 = 60;
const RED_BLACK_KEYS: [i64; 8] = [7, 3, 18, 10, 22, 8, 11, 26];
const AVL_KEYS: [i64; 5] = [10, 20, 30, 40, 50];
const BTREE_KEYS: [i64; 9] = [10, 20, 30, 40, 50, 60, 70, 80, 90];
const HEAP_KEYS: [i64; 7] = [4, 10, 3, 5, 1, 8, 7];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    pub name: String,
    pub kind: SceneKind,
    pub ops: Vec<SceneOp>,
}

impl SceneDescriptor {
    /// The scene with its built-in input.
    pub fn builtin(kind: SceneKind) -> Self {
        let ops = match kind {
            SceneKind::BinaryTree => vec![SceneOp::Build(BINARY_TREE_KEYS.to_vec())],
            SceneKind::Bst => {
                let mut ops = inserts(&BST_KEYS);
                ops.extend(BST_DELETES.iter().map(|key| SceneOp::Delete(*key)));
                ops.push(SceneOp::Search(BST_SEARCH));
                ops
            }
            SceneKind::RedBlack => inserts(&RED_BLACK_KEYS),
            SceneKind::Avl => inserts(&AVL_KEYS),
            SceneKind::BTree => inserts(&BTREE_KEYS),
            SceneKind::Heap => {
                let mut ops = inserts(&HEAP_KEYS);
                ops.push(SceneOp::Extract);
                ops
            }
            SceneKind::QuickHull => vec![SceneOp::Hull(ring_points(42))],
        };
        Self {
            name: kind.name().to_string(),
            kind,
            ops,
        }
    }

    /// The scene fed from the input configuration. A fixed list without
    /// values, and without a count, is the built-in scene.
    pub fn from_config(kind: SceneKind, config: &AppConfig) -> Result<Self> {
        let input = &config.input;
        let uses_builtin = input.distribution == Distribution::FixedList
            && input.values.is_empty()
            && input.points.is_empty()
            && input.count == 0;
        if uses_builtin {
            return Ok(Self::builtin(kind));
        }

        let ops = match kind {
            SceneKind::QuickHull => vec![SceneOp::Hull(input.points(&ring_points(input.seed))?)],
            SceneKind::BinaryTree => vec![SceneOp::Build(input.keys(&BINARY_TREE_KEYS)?)],
            SceneKind::Bst => {
                let keys = input.keys(&BST_KEYS)?;
                let mut ops = inserts(&keys);
                if let Some(last) = keys.last() {
                    ops.push(SceneOp::Search(*last));
                }
                ops
            }
            SceneKind::RedBlack => inserts(&input.keys(&RED_BLACK_KEYS)?),
            SceneKind::Avl => inserts(&input.keys(&AVL_KEYS)?),
            SceneKind::BTree => inserts(&input.keys(&BTREE_KEYS)?),
            SceneKind::Heap => {
                let mut ops = inserts(&input.keys(&HEAP_KEYS)?);
                ops.push(SceneOp::Extract);
                ops
            }
        };
        Ok(Self {
            name: kind.name().to_string(),
            kind,
            ops,
        })
    }
}

fn inserts(keys: &[i64]) -> Vec<SceneOp> {
    keys.iter().map(|key| SceneOp::Insert(*key)).collect()
}

/// Seeded point cloud: a slightly noisy outer ring, a second ring just
/// outside it, and clutter inside that QuickHull prunes.
pub fn ring_points(seed: u64) -> Vec<Point> {
    let mut rng = StdRng::seed_from_u64(seed);
    let polar = |r: f64, angle: f64| Point::new(r * angle.cos(), r * angle.sin());
    let mut points = Vec::with_capacity(88);

    for i in 0..16 {
        let r = 3.0 + rng.gen_range(-0.2..0.2);
        points.push(polar(r, TAU * f64::from(i) / 16.0));
    }
    for _ in 0..40 {
        let r = rng.gen_range(0.5..2.5);
        points.push(polar(r, rng.gen_range(0.0..TAU)));
    }
    for i in 0..12 {
        points.push(polar(3.2, 0.1 + (TAU - 0.1) * f64::from(i) / 12.0));
    }
    for _ in 0..20 {
        let r = rng.gen_range(1.5..2.8);
        points.push(polar(r, rng.gen_range(0.0..TAU)));
    }
    points
}

/// Trace of one scene operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneStep {
    pub label: String,
    pub trace: Trace,
}

/// Every step of a scene in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneScript {
    pub scene: String,
    pub steps: Vec<SceneStep>,
}

impl SceneScript {
    pub fn event_count(&self) -> usize {
        self.steps.iter().map(|step| step.trace.len()).sum()
    }

    /// True when ordinals increase strictly across all steps.
    pub fn is_ordered(&self) -> bool {
        let mut ordinals = self
            .steps
            .iter()
            .flat_map(|step| step.trace.events())
            .map(|event| event.ordinal);
        let Some(mut previous) = ordinals.next() else {
            return true;
        };
        ordinals.all(|ordinal| {
            let ordered = ordinal > previous;
            previous = ordinal;
            ordered
        })
    }
}

/// Drives a fresh engine through a scene.
#[derive(Debug, Default)]
pub struct SceneRunner;

impl SceneRunner {
    pub fn run(descriptor: &SceneDescriptor, config: &AppConfig) -> Result<SceneScript> {
        let bounds = config.input.range;
        let steps = match descriptor.kind {
            SceneKind::BinaryTree => run_binary_tree(&descriptor.ops)?,
            SceneKind::Bst => run_keyed(&mut Bst::with_bounds(bounds), &descriptor.ops)?,
            SceneKind::RedBlack => {
                run_keyed(&mut RedBlackTree::with_bounds(bounds), &descriptor.ops)?
            }
            SceneKind::Avl => run_keyed(&mut AvlTree::with_bounds(bounds), &descriptor.ops)?,
            SceneKind::BTree => run_keyed(
                &mut BTree::with_bounds(config.btree.order, bounds)?,
                &descriptor.ops,
            )?,
            SceneKind::Heap => run_heap(
                &mut Heap::with_bounds(config.heap.kind, bounds),
                &descriptor.ops,
            )?,
            SceneKind::QuickHull => run_hull(&descriptor.ops)?,
        };

        let script = SceneScript {
            scene: descriptor.name.clone(),
            steps,
        };
        tracing::info!(
            scene = %descriptor.name,
            steps = script.steps.len(),
            events = script.event_count(),
            "scene finished"
        );
        Ok(script)
    }
}

fn step(op: &SceneOp, trace: Trace) -> SceneStep {
    SceneStep {
        label: op.to_string(),
        trace,
    }
}

fn run_keyed<E: KeyedEngine>(engine: &mut E, ops: &[SceneOp]) -> Result<Vec<SceneStep>> {
    ops.iter()
        .map(|op| {
            let trace = match op {
                SceneOp::Insert(key) => engine.insert(*key)?.trace,
                SceneOp::Delete(key) => engine.delete(*key)?.trace,
                SceneOp::Search(key) => engine.search(*key).trace,
                SceneOp::Build(_) | SceneOp::Extract | SceneOp::Hull(_) => {
                    return Err(AlgoVizError::Unsupported(
                        "operation on a keyed search structure",
                    ))
                }
            };
            tracing::debug!(engine = engine.name(), %op, len = engine.len(), "step done");
            Ok(step(op, trace))
        })
        .collect()
}

fn run_binary_tree(ops: &[SceneOp]) -> Result<Vec<SceneStep>> {
    let mut recorder = TraceRecorder::new();
    ops.iter()
        .map(|op| match op {
            SceneOp::Build(values) => {
                let tree: BinaryTree<()> = BinaryTree::from_level_order(values, &mut recorder);
                tracing::debug!(shape = ?tree.shape(), "built level-order tree");
                Ok(step(op, recorder.take()))
            }
            _ => Err(AlgoVizError::Unsupported("operation on a plain binary tree")),
        })
        .collect()
}

fn run_heap(heap: &mut Heap, ops: &[SceneOp]) -> Result<Vec<SceneStep>> {
    ops.iter()
        .map(|op| {
            let trace = match op {
                SceneOp::Insert(value) => heap.insert(*value)?.trace,
                SceneOp::Extract => heap.extract().trace,
                _ => return Err(AlgoVizError::Unsupported("operation on a heap")),
            };
            Ok(step(op, trace))
        })
        .collect()
}

fn run_hull(ops: &[SceneOp]) -> Result<Vec<SceneStep>> {
    ops.iter()
        .map(|op| match op {
            SceneOp::Hull(points) => {
                let mut hull = QuickHull::new(points.clone())?;
                Ok(step(op, hull.solve().trace))
            }
            _ => Err(AlgoVizError::Unsupported("operation on a point set")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::EventKind;

    fn run(kind: SceneKind) -> SceneScript {
        SceneRunner::run(&SceneDescriptor::builtin(kind), &AppConfig::default()).unwrap()
    }

    #[test]
    fn every_builtin_scene_runs_in_order() {
        for kind in SceneKind::ALL {
            let script = run(kind);
            assert_eq!(script.scene, kind.name());
            assert!(!script.steps.is_empty(), "{kind} produced no steps");
            assert!(script.is_ordered(), "{kind} reordered events");
        }
    }

    #[test]
    fn heap_scene_extracts_the_maximum() {
        let script = run(SceneKind::Heap);
        let last = script.steps.last().unwrap();

        assert_eq!(last.label, "extract");
        assert_eq!(last.trace.events()[0].kind, EventKind::Swap);
        assert_eq!(
            last.trace.events()[1].changes[0].before,
            crate::trace::AttrValue::Int(10)
        );
    }

    #[test]
    fn bst_scene_covers_deletes_and_search() {
        let script = run(SceneKind::Bst);
        let labels: Vec<&str> = script.steps.iter().map(|s| s.label.as_str()).collect();

        assert_eq!(labels.len(), 15);
        assert_eq!(labels[10], "delete 5");
        assert_eq!(labels[14], "search 60");
    }

    #[test]
    fn quickhull_scene_prunes_the_clutter() {
        let script = run(SceneKind::QuickHull);
        let trace = &script.steps[0].trace;

        assert_eq!(ring_points(42).len(), 88);
        assert!(trace.count(EventKind::MarkPruned) >= 60);
        assert!(trace.count(EventKind::MarkHull) >= 3);
    }

    #[test]
    fn uniform_config_draws_distinct_keys() {
        let mut config = AppConfig::default();
        config.input.distribution = Distribution::Uniform;
        config.input.count = 25;
        config.input.seed = 7;

        let descriptor = SceneDescriptor::from_config(SceneKind::RedBlack, &config).unwrap();
        assert_eq!(descriptor.ops.len(), 25);
        let again = SceneDescriptor::from_config(SceneKind::RedBlack, &config).unwrap();
        assert_eq!(descriptor, again);

        let script = SceneRunner::run(&descriptor, &config).unwrap();
        let attaches: usize = script
            .steps
            .iter()
            .map(|step| step.trace.count(EventKind::Attach))
            .sum();
        assert_eq!(attaches, 25);
    }

    #[test]
    fn default_config_is_the_builtin_scene() {
        let config = AppConfig::default();
        for kind in SceneKind::ALL {
            assert_eq!(
                SceneDescriptor::from_config(kind, &config).unwrap(),
                SceneDescriptor::builtin(kind)
            );
        }
    }

    #[test]
    fn unsupported_ops_are_rejected() {
        let descriptor = SceneDescriptor {
            name: "odd".to_string(),
            kind: SceneKind::Avl,
            ops: vec![SceneOp::Extract],
        };
        let err = SceneRunner::run(&descriptor, &AppConfig::default()).unwrap_err();
        assert!(matches!(err, AlgoVizError::Unsupported(_)));
    }

    #[test]
    fn parses_scene_names() {
        assert_eq!("b-tree".parse::<SceneKind>().unwrap(), SceneKind::BTree);
        assert_eq!("QuickHull".parse::<SceneKind>().unwrap(), SceneKind::QuickHull);
        assert!("splay".parse::<SceneKind>().is_err());
    }
}
