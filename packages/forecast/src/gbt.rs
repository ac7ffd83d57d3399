//! Histogram gradient-boosted regression trees.
//!
//! Squared-error boosting: every round fits a depth-limited tree to the
//! current residuals and adds its shrunken output to the running
//! prediction, starting from the target mean.
//!
//! Features are bucketed once before training. Numeric columns get up to
//! `max_bins` quantile buckets and split on bucket edges. Categorical
//! columns get one bucket per category; at each node the categories are
//! ordered by mean gradient and the best prefix of that order goes left.
//! Missing values (and categories unseen in training) are routed to
//! whichever side gave the larger gain when the split was chosen.
//!
//! Training has no sampling. Equal-gain candidates resolve to the first
//! one scanned, so the same input always yields the same model.

use taxi_demand_forecast_models::BoostingParams;
use taxi_demand_grid_models::MissingColumns;

use crate::{ColumnKind, FeatureMatrix, FittedRegressor, ForecastError, Regressor};

const MISSING: u16 = u16::MAX;
const MAX_BINS_LIMIT: usize = 1024;
const MIN_GAIN: f64 = 1e-12;

/// Gradient-boosted tree regressor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GradientBoostedTrees {
    params: BoostingParams,
}

impl GradientBoostedTrees {
    /// Creates a regressor with the given hyperparameters.
    #[must_use]
    pub const fn new(params: BoostingParams) -> Self {
        Self { params }
    }

    /// Hyperparameters of this regressor.
    #[must_use]
    pub const fn params(&self) -> &BoostingParams {
        &self.params
    }

    fn validate(&self) -> Result<(), ForecastError> {
        let p = &self.params;
        let problem = if p.n_estimators == 0 {
            Some("n_estimators must be at least 1".to_string())
        } else if !(p.learning_rate.is_finite() && p.learning_rate > 0.0) {
            Some(format!("learning_rate must be positive, got {}", p.learning_rate))
        } else if p.max_depth == 0 {
            Some("max_depth must be at least 1".to_string())
        } else if p.min_samples_leaf == 0 {
            Some("min_samples_leaf must be at least 1".to_string())
        } else if !(2..=MAX_BINS_LIMIT).contains(&p.max_bins) {
            Some(format!(
                "max_bins must be between 2 and {MAX_BINS_LIMIT}, got {}",
                p.max_bins
            ))
        } else {
            None
        };
        problem.map_or(Ok(()), |message| {
            Err(ForecastError::InvalidParameter { message })
        })
    }
}

// ── Binning ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum BinMapper {
    /// A value `v` falls in bucket `j` when `j` is the first index with
    /// `v <= thresholds[j]`, or in the last bucket if there is none.
    Numeric { thresholds: Vec<f64> },
    /// Sorted category codes; the bucket is the position in this list.
    Categorical { categories: Vec<i64> },
}

impl BinMapper {
    fn numeric(column: impl Iterator<Item = f64>, max_bins: usize) -> Self {
        let mut sorted: Vec<f64> = column.filter(|v| !v.is_nan()).collect();
        sorted.sort_by(f64::total_cmp);

        let mut distinct = sorted.clone();
        distinct.dedup();

        let thresholds = if distinct.len() <= max_bins {
            distinct.pop();
            distinct
        } else {
            let max = distinct[distinct.len() - 1];
            let n = sorted.len();
            let mut edges: Vec<f64> = (1..max_bins)
                .map(|b| sorted[b * n / max_bins])
                .filter(|&v| v < max)
                .collect();
            edges.dedup();
            edges
        };
        Self::Numeric { thresholds }
    }

    fn categorical(column: impl Iterator<Item = f64>) -> Self {
        let mut categories: Vec<i64> = column.filter_map(category_code).collect();
        categories.sort_unstable();
        categories.dedup();
        Self::Categorical { categories }
    }

    fn n_bins(&self) -> usize {
        match self {
            Self::Numeric { thresholds } => thresholds.len() + 1,
            Self::Categorical { categories } => categories.len(),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn bin(&self, value: f64) -> u16 {
        match self {
            Self::Numeric { thresholds } => {
                if value.is_nan() {
                    MISSING
                } else {
                    thresholds.partition_point(|&t| t < value) as u16
                }
            }
            Self::Categorical { categories } => category_code(value)
                .and_then(|code| categories.binary_search(&code).ok())
                .map_or(MISSING, |idx| idx as u16),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn category_code(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0).then_some(value as i64)
}

// ── Trees ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Rule {
    /// Left when the value is at most the threshold.
    Threshold(f64),
    /// Left when the category is in the (sorted) set.
    Categories(Vec<i64>),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        rule: Rule,
        missing_left: bool,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: &[f64], mappers: &[BinMapper]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    rule,
                    missing_left,
                    left,
                    right,
                } => {
                    let value = row[*feature];
                    let go_left = match rule {
                        Rule::Threshold(t) => {
                            if value.is_nan() {
                                *missing_left
                            } else {
                                value <= *t
                            }
                        }
                        Rule::Categories(set) => match category_code(value) {
                            Some(code) if set.binary_search(&code).is_ok() => true,
                            Some(_) if mappers[*feature].bin(value) != MISSING => false,
                            _ => *missing_left,
                        },
                    };
                    idx = if go_left { *left } else { *right };
                }
            }
        }
    }
}

/// Which buckets of the split feature go left.
enum LeftBins {
    UpTo(usize),
    Mask(Vec<bool>),
}

struct Candidate {
    gain: f64,
    feature: usize,
    missing_left: bool,
    left_bins: LeftBins,
    rule: Rule,
}

impl Candidate {
    fn goes_left(&self, bin: u16) -> bool {
        if bin == MISSING {
            return self.missing_left;
        }
        match &self.left_bins {
            LeftBins::UpTo(last) => usize::from(bin) <= *last,
            LeftBins::Mask(mask) => mask[usize::from(bin)],
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GradSum {
    g: f64,
    n: usize,
}

impl GradSum {
    fn add(&mut self, g: f64) {
        self.g += g;
        self.n += 1;
    }

    fn plus(self, other: Self) -> Self {
        Self {
            g: self.g + other.g,
            n: self.n + other.n,
        }
    }

    fn minus(self, other: Self) -> Self {
        Self {
            g: self.g - other.g,
            n: self.n - other.n,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn score(self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.g * self.g / self.n as f64
        }
    }
}

struct TreeBuilder<'a> {
    params: &'a BoostingParams,
    bins: &'a [Vec<u16>],
    mappers: &'a [BinMapper],
    gradients: &'a [f64],
}

impl TreeBuilder<'_> {
    fn build(&self, split_counts: &mut [u64]) -> Tree {
        let rows: Vec<usize> = (0..self.gradients.len()).collect();
        let mut nodes = Vec::new();
        self.grow(rows, 0, &mut nodes, split_counts);
        Tree { nodes }
    }

    #[allow(clippy::cast_precision_loss)]
    fn grow(
        &self,
        rows: Vec<usize>,
        depth: usize,
        nodes: &mut Vec<Node>,
        split_counts: &mut [u64],
    ) -> usize {
        let mut total = GradSum::default();
        let mut sum_sq = 0.0;
        for &r in &rows {
            total.add(self.gradients[r]);
            sum_sq += self.gradients[r] * self.gradients[r];
        }
        let idx = nodes.len();
        nodes.push(Node::Leaf(
            -total.g / total.n as f64 * self.params.learning_rate,
        ));

        if depth >= self.params.max_depth || rows.len() < 2 * self.params.min_samples_leaf {
            return idx;
        }
        // Gains below rounding noise of the node's gradients are not splits.
        let min_gain = MIN_GAIN * (1.0 + sum_sq);
        let Some(candidate) = self.best_split(&rows, total, min_gain) else {
            return idx;
        };

        let column = &self.bins[candidate.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| candidate.goes_left(column[r]));

        let left = self.grow(left_rows, depth + 1, nodes, split_counts);
        let right = self.grow(right_rows, depth + 1, nodes, split_counts);

        split_counts[candidate.feature] += 1;
        nodes[idx] = Node::Split {
            feature: candidate.feature,
            rule: candidate.rule,
            missing_left: candidate.missing_left,
            left,
            right,
        };
        idx
    }

    /// Scans every feature for the split with the largest gain above
    /// `min_gain`.
    ///
    /// Bins are visited in order (numeric) or by ascending mean gradient
    /// (categorical), and each prefix of that order is a candidate left
    /// side. The full prefix is a candidate too, which separates missing
    /// values from all present ones.
    #[allow(clippy::cast_precision_loss)]
    fn best_split(&self, rows: &[usize], total: GradSum, min_gain: f64) -> Option<Candidate> {
        let parent = total.score();
        let min_leaf = self.params.min_samples_leaf;
        let mut best: Option<Candidate> = None;

        for (feature, mapper) in self.mappers.iter().enumerate() {
            let n_bins = mapper.n_bins();
            let mut hist = vec![GradSum::default(); n_bins];
            let mut missing = GradSum::default();
            for &r in rows {
                let bin = self.bins[feature][r];
                if bin == MISSING {
                    missing.add(self.gradients[r]);
                } else {
                    hist[usize::from(bin)].add(self.gradients[r]);
                }
            }
            let present = total.minus(missing);

            let order: Vec<usize> = match mapper {
                BinMapper::Numeric { .. } => (0..n_bins).collect(),
                BinMapper::Categorical { .. } => {
                    let mut occupied: Vec<usize> =
                        (0..n_bins).filter(|&b| hist[b].n > 0).collect();
                    occupied.sort_by(|&a, &b| {
                        let mean_a = hist[a].g / hist[a].n as f64;
                        let mean_b = hist[b].g / hist[b].n as f64;
                        mean_a.total_cmp(&mean_b)
                    });
                    occupied
                }
            };

            let mut left = GradSum::default();
            for (k, &bin) in order.iter().enumerate() {
                left = left.plus(hist[bin]);
                let right = present.minus(left);

                for missing_left in [true, false] {
                    let (l, r) = if missing_left {
                        (left.plus(missing), right)
                    } else {
                        (left, right.plus(missing))
                    };
                    if l.n < min_leaf || r.n < min_leaf {
                        continue;
                    }
                    let gain = l.score() + r.score() - parent;
                    let threshold = best.as_ref().map_or(min_gain, |b| b.gain);
                    if gain > threshold {
                        let (left_bins, rule) = split_sides(mapper, &order[..=k], bin);
                        best = Some(Candidate {
                            gain,
                            feature,
                            missing_left,
                            left_bins,
                            rule,
                        });
                    }
                }
            }
        }

        best
    }
}

/// Training and prediction forms of a split whose left side is
/// `left_order` (categorical) or every bin up to `last` (numeric).
fn split_sides(mapper: &BinMapper, left_order: &[usize], last: usize) -> (LeftBins, Rule) {
    match mapper {
        BinMapper::Numeric { thresholds } => (
            LeftBins::UpTo(last),
            Rule::Threshold(thresholds.get(last).copied().unwrap_or(f64::INFINITY)),
        ),
        BinMapper::Categorical { categories } => {
            let mut mask = vec![false; categories.len()];
            for &b in left_order {
                mask[b] = true;
            }
            let mut set: Vec<i64> = left_order.iter().map(|&b| categories[b]).collect();
            set.sort_unstable();
            (LeftBins::Mask(mask), Rule::Categories(set))
        }
    }
}

// ── Fitting ──────────────────────────────────────────────────────────────

/// A trained [`GradientBoostedTrees`] model.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedTrees {
    columns: Vec<String>,
    mappers: Vec<BinMapper>,
    base_score: f64,
    trees: Vec<Tree>,
    split_counts: Vec<u64>,
}

impl FittedTrees {
    /// Number of boosting rounds in the model.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// The constant every prediction starts from (the training mean).
    #[must_use]
    pub const fn base_score(&self) -> f64 {
        self.base_score
    }
}

impl Regressor for GradientBoostedTrees {
    type Fitted = FittedTrees;

    #[allow(clippy::cast_precision_loss)]
    fn fit(&self, features: &FeatureMatrix, target: &[f64]) -> Result<FittedTrees, ForecastError> {
        self.validate()?;
        let n_rows = features.n_rows();
        if target.len() != n_rows {
            return Err(ForecastError::DimensionMismatch {
                expected: n_rows,
                actual: target.len(),
            });
        }
        if n_rows == 0 {
            return Err(ForecastError::Configuration {
                message: "cannot fit a model on zero rows".to_string(),
            });
        }
        if target.iter().any(|y| !y.is_finite()) {
            return Err(ForecastError::Configuration {
                message: "target contains non-finite values".to_string(),
            });
        }

        let n_cols = features.n_cols();
        let mappers: Vec<BinMapper> = (0..n_cols)
            .map(|c| {
                let column = (0..n_rows).map(|r| features.get(r, c));
                match features.kind(c) {
                    ColumnKind::Numeric => BinMapper::numeric(column, self.params.max_bins),
                    ColumnKind::Categorical => BinMapper::categorical(column),
                }
            })
            .collect();
        if let Some(c) = mappers.iter().position(|m| m.n_bins() >= usize::from(MISSING)) {
            return Err(ForecastError::InvalidParameter {
                message: format!("column '{}' has too many categories", features.columns()[c]),
            });
        }

        let bins: Vec<Vec<u16>> = mappers
            .iter()
            .enumerate()
            .map(|(c, mapper)| (0..n_rows).map(|r| mapper.bin(features.get(r, c))).collect())
            .collect();

        let base_score = target.iter().sum::<f64>() / n_rows as f64;
        let mut predictions = vec![base_score; n_rows];
        let mut gradients = vec![0.0; n_rows];
        let mut split_counts = vec![0u64; n_cols];
        let mut trees = Vec::with_capacity(self.params.n_estimators);

        for round in 0..self.params.n_estimators {
            for ((g, p), y) in gradients.iter_mut().zip(&predictions).zip(target) {
                *g = p - y;
            }

            let builder = TreeBuilder {
                params: &self.params,
                bins: &bins,
                mappers: &mappers,
                gradients: &gradients,
            };
            let tree = builder.build(&mut split_counts);

            for (r, p) in predictions.iter_mut().enumerate() {
                *p += tree.predict(features.row(r), &mappers);
            }
            trees.push(tree);

            if (round + 1) % 50 == 0 {
                log::debug!("Boosting round {}/{}", round + 1, self.params.n_estimators);
            }
        }

        log::info!(
            "Fitted {} trees on {} rows x {} features",
            trees.len(),
            n_rows,
            n_cols
        );

        Ok(FittedTrees {
            columns: features.columns().to_vec(),
            mappers,
            base_score,
            trees,
            split_counts,
        })
    }
}

impl FittedRegressor for FittedTrees {
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ForecastError> {
        let required: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        MissingColumns::check("predict", features.columns(), &required)?;
        let indices: Vec<usize> = required
            .iter()
            .filter_map(|name| features.column_index(name))
            .collect();

        let mut row = vec![0.0; indices.len()];
        Ok((0..features.n_rows())
            .map(|r| {
                for (slot, &c) in row.iter_mut().zip(&indices) {
                    *slot = features.get(r, c);
                }
                self.base_score
                    + self
                        .trees
                        .iter()
                        .map(|t| t.predict(&row, &self.mappers))
                        .sum::<f64>()
            })
            .collect())
    }

    fn feature_importance(&self) -> Vec<(String, u64)> {
        let mut importance: Vec<(String, u64)> = self
            .columns
            .iter()
            .cloned()
            .zip(self.split_counts.iter().copied())
            .collect();
        importance.sort_by(|a, b| b.1.cmp(&a.1));
        importance
    }
}
