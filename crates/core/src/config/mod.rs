use std::path::Path;

use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{heap::HeapKind, hull::Point, record::RecordingSettings, AlgoVizError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub btree: BTreeConfig,
    pub heap: HeapConfig,
    pub output: RecordingSettings,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(?path, "loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.input.range.validate()?;
        self.btree.validate()
    }
}

/// How the input sequence of a scene is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Distribution {
    Uniform,
    #[default]
    FixedList,
}

/// Input options recognised by the engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub seed: u64,
    /// Number of values to use; `0` keeps the whole fixed list.
    pub count: usize,
    pub distribution: Distribution,
    /// Keys for `fixed-list`. Empty means the scene's own list.
    pub values: Vec<i64>,
    /// Points for `fixed-list` hull scenes. Empty means the scene's own set.
    pub points: Vec<[f64; 2]>,
    /// Accepted key range for scenes; uniform sampling draws from it too.
    pub range: KeyBounds,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            count: 0,
            distribution: Distribution::FixedList,
            values: Vec::new(),
            points: Vec::new(),
            range: KeyBounds::new(0, 999),
        }
    }
}

impl InputConfig {
    /// Produces the key sequence for a tree or heap scene.
    pub fn keys(&self, defaults: &[i64]) -> Result<Vec<i64>> {
        match self.distribution {
            Distribution::FixedList => {
                let source = if self.values.is_empty() {
                    defaults
                } else {
                    &self.values
                };
                let keys = self.truncate(source.to_vec());
                for key in &keys {
                    self.range.check(*key)?;
                }
                Ok(keys)
            }
            Distribution::Uniform => self.sample_keys(),
        }
    }

    /// Produces the point set for a hull scene.
    pub fn points(&self, defaults: &[Point]) -> Result<Vec<Point>> {
        let points = match self.distribution {
            Distribution::FixedList => {
                let source: Vec<Point> = if self.points.is_empty() {
                    defaults.to_vec()
                } else {
                    self.points.iter().map(|[x, y]| Point::new(*x, *y)).collect()
                };
                self.truncate(source)
            }
            Distribution::Uniform => {
                self.range.validate()?;
                if self.count == 0 {
                    return Err(AlgoVizError::invalid("cannot draw 0 points"));
                }
                let mut rng = StdRng::seed_from_u64(self.seed);
                let (lo, hi) = (self.range.min as f64, self.range.max as f64);
                (0..self.count)
                    .map(|_| Point::new(rng.gen_range(lo..=hi), rng.gen_range(lo..=hi)))
                    .collect()
            }
        };
        for point in &points {
            point.validate()?;
        }
        Ok(points)
    }

    fn truncate<T>(&self, mut items: Vec<T>) -> Vec<T> {
        if self.count > 0 {
            items.truncate(self.count);
        }
        items
    }

    fn sample_keys(&self) -> Result<Vec<i64>> {
        self.range.validate()?;
        let span = self.range.span();
        if self.count == 0 || self.count > span {
            return Err(AlgoVizError::invalid(format!(
                "cannot draw {} distinct keys from {}..={}",
                self.count, self.range.min, self.range.max
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        Ok(index::sample(&mut rng, span, self.count)
            .into_iter()
            .map(|offset| self.range.min + offset as i64)
            .collect())
    }
}

/// Inclusive range of keys an engine accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBounds {
    pub min: i64,
    pub max: i64,
}

/// Non-negative keys.
impl Default for KeyBounds {
    fn default() -> Self {
        Self {
            min: 0,
            max: i64::MAX,
        }
    }
}

impl KeyBounds {
    pub const fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub const fn unbounded() -> Self {
        Self::new(i64::MIN, i64::MAX)
    }

    pub fn contains(&self, key: i64) -> bool {
        (self.min..=self.max).contains(&key)
    }

    pub fn check(&self, key: i64) -> Result<()> {
        if self.contains(key) {
            Ok(())
        } else {
            Err(AlgoVizError::invalid(format!(
                "key {key} is outside {}..={}",
                self.min, self.max
            )))
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min > self.max {
            return Err(AlgoVizError::invalid(format!(
                "empty key range {}..={}",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// Number of keys in the range, saturating at `usize::MAX`.
    fn span(&self) -> usize {
        let width = i128::from(self.max) - i128::from(self.min) + 1;
        usize::try_from(width).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BTreeConfig {
    /// Maximum number of children per node.
    pub order: usize,
}

impl Default for BTreeConfig {
    fn default() -> Self {
        Self { order: 3 }
    }
}

impl BTreeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.order < 3 {
            return Err(AlgoVizError::invalid(format!(
                "b-tree order must be at least 3, got {}",
                self.order
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    pub kind: HeapKind,
}
