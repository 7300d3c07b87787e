#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Sparse spatial weights for areal units.
//!
//! A [`SpatialWeights`] value stores, for each of `n` keyed units, the
//! units it considers neighbors and the weight attached to each link. The
//! layout is compressed sparse row: `offsets[i]..offsets[i + 1]` indexes
//! into parallel `neighbors`/`weights` arrays, sorted by neighbor index
//! within each row.
//!
//! Weights are immutable once built. Transformations such as
//! [`SpatialWeights::row_standardized`] return a new value, so a single
//! structure can be shared read-only across any number of concurrent
//! statistic runs.
//!
//! Builders for polygon contiguity and point distance bands live in
//! [`builder`].

pub mod builder;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use builder::{Contiguity, contiguity, distance_band};

/// Errors raised while building or aligning spatial weights.
#[derive(Debug, Error)]
pub enum WeightsError {
    /// Two inputs that must align positionally have different lengths.
    #[error("Length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Length implied by the weights.
        expected: usize,
        /// Length of the other input.
        actual: usize,
    },

    /// The same unit key appears twice.
    #[error("Duplicate unit key: {0}")]
    DuplicateKey(String),

    /// A keyed input has no entry for a unit in the weights.
    #[error("Missing value for unit key: {0}")]
    MissingKey(String),

    /// A neighbor index points outside the unit range.
    #[error("Unit {unit} lists neighbor {neighbor}, but only {len} units exist")]
    NeighborOutOfRange {
        /// Row the bad link was found in.
        unit: usize,
        /// Offending neighbor index.
        neighbor: usize,
        /// Number of units.
        len: usize,
    },

    /// A link weight is negative or non-finite.
    #[error("Unit {unit} has invalid weight {weight}")]
    InvalidWeight {
        /// Row the bad weight was found in.
        unit: usize,
        /// Offending weight.
        weight: f64,
    },

    /// A distance band radius is negative or non-finite.
    #[error("Invalid distance band radius: {0}")]
    InvalidRadius(f64),
}

/// How the weights of a structure were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightsStyle {
    /// Every link has weight 1 ("B").
    Binary,
    /// Each non-empty row sums to 1 ("W").
    RowStandardized,
    /// Anything else.
    Custom,
}

/// Compressed sparse row spatial weights over keyed units.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialWeights {
    keys: Vec<String>,
    index: BTreeMap<String, usize>,
    offsets: Vec<usize>,
    neighbors: Vec<u32>,
    weights: Vec<f64>,
    style: WeightsStyle,
}

impl SpatialWeights {
    /// Builds binary weights from per-unit neighbor index lists.
    ///
    /// Duplicate links within a row are collapsed.
    ///
    /// # Errors
    ///
    /// * [`WeightsError::LengthMismatch`] if `adjacency.len() != keys.len()`
    /// * [`WeightsError::DuplicateKey`] if a key repeats
    /// * [`WeightsError::NeighborOutOfRange`] for an index `>= keys.len()`
    pub fn from_adjacency(
        keys: Vec<String>,
        adjacency: &[Vec<usize>],
    ) -> Result<Self, WeightsError> {
        let rows = adjacency
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row.sort_unstable();
                row.dedup();
                row.into_iter().map(|j| (j, 1.0)).collect()
            })
            .collect();

        let mut weights = Self::from_weighted(keys, rows)?;
        weights.style = WeightsStyle::Binary;
        Ok(weights)
    }

    /// Builds weights from per-unit `(neighbor index, weight)` lists.
    ///
    /// Zero-weight links are dropped. Repeated links within a row are
    /// summed. The resulting style is inferred from the weights.
    ///
    /// # Errors
    ///
    /// * [`WeightsError::LengthMismatch`] if `rows.len() != keys.len()`
    /// * [`WeightsError::DuplicateKey`] if a key repeats
    /// * [`WeightsError::NeighborOutOfRange`] for an index `>= keys.len()`
    /// * [`WeightsError::InvalidWeight`] for negative or non-finite weights
    pub fn from_weighted(
        keys: Vec<String>,
        rows: Vec<Vec<(usize, f64)>>,
    ) -> Result<Self, WeightsError> {
        let n = keys.len();
        if rows.len() != n {
            return Err(WeightsError::LengthMismatch {
                expected: n,
                actual: rows.len(),
            });
        }

        let mut index = BTreeMap::new();
        for (i, key) in keys.iter().enumerate() {
            if index.insert(key.clone(), i).is_some() {
                return Err(WeightsError::DuplicateKey(key.clone()));
            }
        }

        let mut offsets = Vec::with_capacity(n + 1);
        let mut neighbors = Vec::new();
        let mut weights = Vec::new();
        offsets.push(0);

        for (i, mut row) in rows.into_iter().enumerate() {
            for &(j, w) in &row {
                if j >= n {
                    return Err(WeightsError::NeighborOutOfRange {
                        unit: i,
                        neighbor: j,
                        len: n,
                    });
                }
                if !w.is_finite() || w < 0.0 {
                    return Err(WeightsError::InvalidWeight { unit: i, weight: w });
                }
            }

            row.sort_by_key(|&(j, _)| j);

            let mut last: Option<usize> = None;
            for (j, w) in row {
                if w == 0.0 {
                    continue;
                }
                if last == Some(j) {
                    if let Some(total) = weights.last_mut() {
                        *total += w;
                    }
                    continue;
                }
                neighbors.push(compact(j));
                weights.push(w);
                last = Some(j);
            }

            offsets.push(neighbors.len());
        }

        let mut built = Self {
            keys,
            index,
            offsets,
            neighbors,
            weights,
            style: WeightsStyle::Custom,
        };
        built.style = built.infer_style();

        Ok(built)
    }

    fn infer_style(&self) -> WeightsStyle {
        if self.is_binary() {
            WeightsStyle::Binary
        } else if (0..self.len())
            .filter(|&i| self.cardinality(i) > 0)
            .all(|i| (self.row_sum(i) - 1.0).abs() < 1e-12)
        {
            WeightsStyle::RowStandardized
        } else {
            WeightsStyle::Custom
        }
    }

    /// Number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether there are no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Style of the weights.
    #[must_use]
    pub const fn style(&self) -> WeightsStyle {
        self.style
    }

    /// Unit keys in positional order.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Key of unit `i`.
    #[must_use]
    pub fn key(&self, i: usize) -> &str {
        &self.keys[i]
    }

    /// Position of the unit with the given key.
    #[must_use]
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Sorted neighbor indices of unit `i`.
    #[must_use]
    pub fn neighbors(&self, i: usize) -> &[u32] {
        &self.neighbors[self.offsets[i]..self.offsets[i + 1]]
    }

    /// Link weights of unit `i`, parallel to [`Self::neighbors`].
    #[must_use]
    pub fn row_weights(&self, i: usize) -> &[f64] {
        &self.weights[self.offsets[i]..self.offsets[i + 1]]
    }

    /// `(neighbor index, weight)` pairs of unit `i`.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.neighbors(i)
            .iter()
            .zip(self.row_weights(i))
            .map(|(&j, &w)| (j as usize, w))
    }

    /// Weight of the link `i -> j`, `0.0` when absent.
    #[must_use]
    pub fn weight(&self, i: usize, j: usize) -> f64 {
        self.neighbors(i)
            .binary_search(&compact(j))
            .map_or(0.0, |pos| self.row_weights(i)[pos])
    }

    /// Number of links out of unit `i` (including a self link, if any).
    #[must_use]
    pub fn cardinality(&self, i: usize) -> usize {
        self.offsets[i + 1] - self.offsets[i]
    }

    /// Sum of the weights out of unit `i`.
    #[must_use]
    pub fn row_sum(&self, i: usize) -> f64 {
        self.row_weights(i).iter().sum()
    }

    /// Whether unit `i` links to itself.
    #[must_use]
    pub fn has_self(&self, i: usize) -> bool {
        self.weight(i, i) != 0.0
    }

    /// Whether unit `i` has no links at all.
    #[must_use]
    pub fn is_island(&self, i: usize) -> bool {
        self.cardinality(i) == 0
    }

    /// Indices of units with no links.
    #[must_use]
    pub fn islands(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.is_island(i)).collect()
    }

    /// Whether every stored weight is exactly 1.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.weights.iter().all(|&w| w == 1.0)
    }

    /// Whether `w_ij == w_ji` for every pair.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        (0..self.len()).all(|i| {
            self.row(i)
                .all(|(j, w)| (self.weight(j, i) - w).abs() < 1e-12)
        })
    }

    /// `S0`: sum of all weights.
    #[must_use]
    pub fn s0(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// `S1 = 1/2 * sum_ij (w_ij + w_ji)^2`.
    #[must_use]
    pub fn s1(&self) -> f64 {
        let mut total = 0.0;
        for i in 0..self.len() {
            for (j, w_ij) in self.row(i) {
                let w_ji = self.weight(j, i);
                if w_ji == 0.0 {
                    // (i, j) and (j, i) both contribute w_ij^2, only one is stored
                    total += 2.0 * w_ij * w_ij;
                } else {
                    total += (w_ij + w_ji).powi(2);
                }
            }
        }
        total / 2.0
    }

    /// `S2 = sum_i (w_i. + w_.i)^2`.
    #[must_use]
    pub fn s2(&self) -> f64 {
        let mut col_sums = vec![0.0; self.len()];
        for (&j, &w) in self.neighbors.iter().zip(&self.weights) {
            col_sums[j as usize] += w;
        }

        col_sums
            .iter()
            .enumerate()
            .map(|(i, col)| (self.row_sum(i) + col).powi(2))
            .sum()
    }

    /// Weighted sum of neighbor values for every unit.
    ///
    /// Islands get `NaN`: they have no neighborhood to summarize.
    ///
    /// # Errors
    ///
    /// * [`WeightsError::LengthMismatch`] if `values.len() != self.len()`
    pub fn lag(&self, values: &[f64]) -> Result<Vec<f64>, WeightsError> {
        self.check_len(values.len())?;

        Ok((0..self.len())
            .map(|i| {
                if self.is_island(i) {
                    f64::NAN
                } else {
                    self.row(i).map(|(j, w)| w * values[j]).sum()
                }
            })
            .collect())
    }

    /// Orders a keyed attribute map to match the weights' unit order.
    ///
    /// Extra keys in `values` are ignored.
    ///
    /// # Errors
    ///
    /// * [`WeightsError::MissingKey`] if a unit has no value
    pub fn align(&self, values: &BTreeMap<String, f64>) -> Result<Vec<f64>, WeightsError> {
        self.keys
            .iter()
            .map(|key| {
                values
                    .get(key)
                    .copied()
                    .ok_or_else(|| WeightsError::MissingKey(key.clone()))
            })
            .collect()
    }

    /// Returns an error unless `actual` equals the number of units.
    ///
    /// # Errors
    ///
    /// * [`WeightsError::LengthMismatch`] on a length difference
    pub const fn check_len(&self, actual: usize) -> Result<(), WeightsError> {
        if actual == self.keys.len() {
            Ok(())
        } else {
            Err(WeightsError::LengthMismatch {
                expected: self.keys.len(),
                actual,
            })
        }
    }

    /// Rescales every non-empty row to sum to 1 ("W" style).
    #[must_use]
    pub fn row_standardized(&self) -> Self {
        let mut out = self.clone();
        for i in 0..out.len() {
            let sum = self.row_sum(i);
            if sum > 0.0 {
                for w in &mut out.weights[out.offsets[i]..out.offsets[i + 1]] {
                    *w /= sum;
                }
            }
        }
        out.style = WeightsStyle::RowStandardized;
        out
    }

    /// Sets every link weight to 1 ("B" style).
    #[must_use]
    pub fn binary(&self) -> Self {
        let mut out = self.clone();
        out.weights.fill(1.0);
        out.style = WeightsStyle::Binary;
        out
    }

    /// Adds a self link with weight 1 to every unit that lacks one.
    ///
    /// Rows of row-standardized weights are re-standardized afterwards.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn with_self(&self) -> Self {
        let standardized = self.style == WeightsStyle::RowStandardized;
        self.rebuild(|i, row| {
            if row.iter().any(|&(j, _)| j == i) {
                return;
            }
            // Equal share with the existing neighbors before re-standardizing.
            let w = if standardized && !row.is_empty() {
                row.iter().map(|&(_, w)| w).sum::<f64>() / row.len() as f64
            } else {
                1.0
            };
            row.push((i, w));
        })
    }

    /// Drops every self link.
    #[must_use]
    pub fn without_self(&self) -> Self {
        self.rebuild(|i, row| row.retain(|&(j, _)| j != i))
    }

    fn rebuild(&self, mut edit: impl FnMut(usize, &mut Vec<(usize, f64)>)) -> Self {
        let mut offsets = Vec::with_capacity(self.offsets.len());
        let mut neighbors = Vec::with_capacity(self.neighbors.len() + self.len());
        let mut weights = Vec::with_capacity(self.weights.len() + self.len());
        offsets.push(0);

        for i in 0..self.len() {
            let mut row: Vec<(usize, f64)> = self.row(i).collect();
            edit(i, &mut row);
            row.sort_by_key(|&(j, _)| j);

            if self.style == WeightsStyle::RowStandardized {
                let sum: f64 = row.iter().map(|&(_, w)| w).sum();
                if sum > 0.0 {
                    for (_, w) in &mut row {
                        *w /= sum;
                    }
                }
            }

            for (j, w) in row {
                neighbors.push(compact(j));
                weights.push(w);
            }
            offsets.push(neighbors.len());
        }

        Self {
            keys: self.keys.clone(),
            index: self.index.clone(),
            offsets,
            neighbors,
            weights,
            style: self.style,
        }
    }
}

/// Neighbor indices are stored as `u32` to halve the CSR footprint.
#[allow(clippy::cast_possible_truncation)]
const fn compact(index: usize) -> u32 {
    index as u32
}
