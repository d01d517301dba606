//! QuickHull over a fixed point set.
//!
//! Every point keeps a [`PointRole`] for the whole run. A directed baseline
//! `from -> to` owns the candidates strictly on its left; the apex splits them
//! into two smaller regions and everything else inside the triangle is
//! pruned. Regions without candidates confirm their baseline endpoints as hull
//! members.

use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    trace::{AttrValue, AttributeChange, Attribute, EventKind, SubjectId, Traced, TraceRecorder},
    AlgoVizError, Result,
};

/// Index of a point in the input set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointId(u32);

impl PointId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn validate(&self) -> Result<()> {
        if self.x.is_finite() && self.y.is_finite() {
            Ok(())
        } else {
            Err(AlgoVizError::invalid(format!(
                "point ({}, {}) is not finite",
                self.x, self.y
            )))
        }
    }

    /// Orders by `x`, then `y`.
    fn lexicographic(&self, other: &Self) -> Ordering {
        self.x
            .total_cmp(&other.x)
            .then_with(|| self.y.total_cmp(&other.y))
    }
}

/// Twice the signed area of `(a, b, p)`; positive when `p` is left of `a -> b`.
pub fn cross(a: Point, b: Point, p: Point) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PointRole {
    #[default]
    Candidate,
    Extreme,
    Apex,
    Pruned,
    HullMember,
}

/// Directed segment between two points already known to be on the hull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    pub from: PointId,
    pub to: PointId,
}

impl Baseline {
    pub const fn new(from: PointId, to: PointId) -> Self {
        Self { from, to }
    }
}

/// Result of one partition step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// `None` when the region had no candidates.
    pub apex: Option<PointId>,
    pub pruned: Vec<PointId>,
    /// Candidates left of `from -> apex`.
    pub left: Vec<PointId>,
    /// Candidates left of `apex -> to`.
    pub right: Vec<PointId>,
}

#[derive(Debug)]
pub struct QuickHull {
    points: Vec<Point>,
    roles: Vec<PointRole>,
    recorder: TraceRecorder,
}

impl QuickHull {
    pub fn new(points: Vec<Point>) -> Result<Self> {
        for point in &points {
            point.validate()?;
        }
        if u32::try_from(points.len()).is_err() {
            return Err(AlgoVizError::invalid("too many points"));
        }
        let roles = vec![PointRole::Candidate; points.len()];
        Ok(Self {
            points,
            roles,
            recorder: TraceRecorder::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn point(&self, id: PointId) -> Option<Point> {
        self.points.get(id.idx()).copied()
    }

    pub fn role(&self, id: PointId) -> Option<PointRole> {
        self.roles.get(id.idx()).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = PointId> + '_ {
        (0..self.points.len() as u32).map(PointId)
    }

    /// Ids currently holding `role`.
    pub fn with_role(&self, role: PointRole) -> Vec<PointId> {
        self.ids().filter(|id| self.roles[id.idx()] == role).collect()
    }

    fn at(&self, id: PointId) -> Point {
        self.points[id.idx()]
    }

    fn check_id(&self, id: PointId) -> Result<()> {
        if id.idx() < self.points.len() {
            Ok(())
        } else {
            Err(AlgoVizError::invalid(format!("unknown point {id}")))
        }
    }

    fn side(&self, baseline: Baseline, id: PointId) -> f64 {
        cross(self.at(baseline.from), self.at(baseline.to), self.at(id))
    }

    fn mark(&mut self, kind: EventKind, id: PointId, role: PointRole, context: &[PointId]) {
        let before = self.roles[id.idx()];
        self.roles[id.idx()] = role;
        let mut subjects = vec![SubjectId::Point(id)];
        subjects.extend(context.iter().map(|p| SubjectId::Point(*p)));
        self.recorder.emit(
            kind,
            subjects,
            vec![AttributeChange::new(
                Attribute::Role,
                AttrValue::Role(before),
                AttrValue::Role(role),
            )],
        );
    }

    /// Confirms `id` as a hull member unless it already is one.
    fn confirm(&mut self, id: PointId) {
        if self.roles[id.idx()] != PointRole::HullMember {
            self.mark(EventKind::MarkHull, id, PointRole::HullMember, &[]);
        }
    }

    /// Farthest candidate from the baseline. Ties go to the larger cross
    /// product, then to the lexicographically smallest coordinate.
    fn pick_apex(&self, candidates: &[PointId], baseline: Baseline) -> Option<PointId> {
        let (a, b) = (self.at(baseline.from), self.at(baseline.to));
        let length = (b.x - a.x).hypot(b.y - a.y);
        let score = |id: PointId| {
            let area = cross(a, b, self.at(id));
            let distance = if length > 0.0 { area.abs() / length } else { 0.0 };
            (distance, area.abs())
        };

        candidates.iter().copied().reduce(|best, id| {
            let (best_distance, best_area) = score(best);
            let (distance, area) = score(id);
            let order = distance
                .total_cmp(&best_distance)
                .then_with(|| area.total_cmp(&best_area))
                .then_with(|| self.at(best).lexicographic(&self.at(id)));
            if order == Ordering::Greater {
                id
            } else {
                best
            }
        })
    }

    /// One step of the recursion: chooses the apex for `baseline`, prunes
    /// what the triangle covers and returns the two outer regions. With no
    /// candidates the baseline endpoints are confirmed instead.
    ///
    /// Every candidate must lie strictly left of the directed baseline.
    pub fn partition(
        &mut self,
        candidates: &[PointId],
        baseline: Baseline,
    ) -> Result<Traced<Partition>> {
        self.check_id(baseline.from)?;
        self.check_id(baseline.to)?;
        for id in candidates {
            self.check_id(*id)?;
            if self.side(baseline, *id) <= 0.0 {
                return Err(AlgoVizError::invalid(format!(
                    "{id} is not left of {} -> {}",
                    baseline.from, baseline.to
                )));
            }
        }

        let partition = self.partition_step(candidates, baseline);
        let traced = self.recorder.finish(partition);
        tracing::debug!(
            candidates = candidates.len(),
            apex = ?traced.value.apex,
            pruned = traced.value.pruned.len(),
            "hull partition"
        );
        Ok(traced)
    }

    fn partition_step(&mut self, candidates: &[PointId], baseline: Baseline) -> Partition {
        let Some(apex) = self.pick_apex(candidates, baseline) else {
            self.confirm(baseline.from);
            self.confirm(baseline.to);
            return Partition::default();
        };
        let ends = [baseline.from, baseline.to];
        self.mark(EventKind::MarkApex, apex, PointRole::Apex, &ends);

        let towards_apex = Baseline::new(baseline.from, apex);
        let from_apex = Baseline::new(apex, baseline.to);
        let mut partition = Partition {
            apex: Some(apex),
            ..Partition::default()
        };
        for id in candidates.iter().copied().filter(|id| *id != apex) {
            if self.side(towards_apex, id) > 0.0 {
                partition.left.push(id);
            } else if self.side(from_apex, id) > 0.0 {
                partition.right.push(id);
            } else {
                self.mark(EventKind::MarkPruned, id, PointRole::Pruned, &ends);
                partition.pruned.push(id);
            }
        }
        partition
    }

    fn solve_region(&mut self, candidates: Vec<PointId>, baseline: Baseline, hull: &mut Vec<PointId>) {
        let partition = self.partition_step(&candidates, baseline);
        if let Some(apex) = partition.apex {
            self.solve_region(partition.left, Baseline::new(baseline.from, apex), hull);
            hull.push(apex);
            self.solve_region(partition.right, Baseline::new(apex, baseline.to), hull);
        }
    }

    /// Runs the whole algorithm and returns the hull clockwise, starting at the
    /// leftmost point. Empty input gives an empty hull and an empty trace.
    pub fn solve(&mut self) -> Traced<Vec<PointId>> {
        let hull = self.solve_inner();
        let traced = self.recorder.finish(hull);
        tracing::debug!(
            points = self.points.len(),
            hull = traced.value.len(),
            pruned = traced.trace.count(EventKind::MarkPruned),
            events = traced.trace.len(),
            "quickhull solved"
        );
        traced
    }

    /// Like [`QuickHull::solve`], but an empty point set is an error.
    pub fn solve_required(&mut self) -> Result<Traced<Vec<PointId>>> {
        if self.points.is_empty() {
            return Err(AlgoVizError::EmptyStructure("point set"));
        }
        Ok(self.solve())
    }

    fn solve_inner(&mut self) -> Vec<PointId> {
        let ids: Vec<PointId> = self.ids().collect();
        let by_position = |a: &PointId, b: &PointId| self.at(*a).lexicographic(&self.at(*b));
        let (Some(left), Some(mut right)) = (
            ids.iter().copied().min_by(by_position),
            ids.iter().copied().max_by(by_position),
        ) else {
            return Vec::new();
        };
        if self.at(left) == self.at(right) {
            right = left;
        }

        self.mark(EventKind::MarkExtreme, left, PointRole::Extreme, &[]);
        if right != left {
            self.mark(EventKind::MarkExtreme, right, PointRole::Extreme, &[]);
        }

        let baseline = Baseline::new(left, right);
        let mut upper = Vec::new();
        let mut lower = Vec::new();
        for id in ids.into_iter().filter(|id| *id != left && *id != right) {
            let side = self.side(baseline, id);
            if side > 0.0 {
                upper.push(id);
            } else if side < 0.0 {
                lower.push(id);
            } else {
                self.mark(EventKind::MarkPruned, id, PointRole::Pruned, &[left, right]);
            }
        }

        if left == right {
            self.confirm(left);
            return vec![left];
        }

        let mut hull = vec![left];
        self.solve_region(upper, baseline, &mut hull);
        hull.push(right);
        self.solve_region(lower, Baseline::new(right, left), &mut hull);
        hull
    }
}
