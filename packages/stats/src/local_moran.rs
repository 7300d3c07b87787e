//! Local Moran's I.
//!
//! Each unit's statistic is its share of the global Moran's I:
//!
//! ```text
//! I_i = (n / S0) * d_i * lag_i / sum_k d_k^2,    lag_i = sum_j w_ij d_j
//! ```
//!
//! so `sum_i I_i` reproduces [`global_moran`](crate::global_moran) exactly
//! for any weights. For row-standardized weights without islands `S0 = n`
//! and this reduces to `d_i * lag_i / sum_k d_k^2`.
//!
//! Moments are Anselin's (1995) closed forms for the classical
//! `d_i * lag_i / m2`, divided by `S0` like the statistic itself. The
//! z-score is unaffected by that constant.

use std::collections::BTreeMap;

use lisa_map_weights::SpatialWeights;

use crate::maybe_rayon::*;
use crate::permutation::{DEFAULT_SEED, folded_pseudo_p, local_moran_simulations};
use crate::{Centered, LocalMoranRecord, LocalStatus, NullModel, Quadrant, StatsError, two_sided_p};

/// Settings for a local Moran run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalMoranOptions {
    /// Null model for the analytical moments.
    pub null_model: NullModel,
    /// Conditional permutations per unit. `0` skips permutation inference.
    pub permutations: usize,
    /// Seed for permutation inference.
    pub seed: u64,
}

impl Default for LocalMoranOptions {
    fn default() -> Self {
        Self {
            null_model: NullModel::Randomization,
            permutations: 0,
            seed: DEFAULT_SEED,
        }
    }
}

/// Local Moran's I for every unit, in the weights' unit order.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMoran {
    /// One record per unit.
    pub records: Vec<LocalMoranRecord>,
    /// Null model used for the moments.
    pub null_model: NullModel,
    /// Attribute mean the values were centered on.
    pub mean: f64,
}

impl LocalMoran {
    /// Number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in unit order.
    pub fn iter(&self) -> impl Iterator<Item = &LocalMoranRecord> {
        self.records.iter()
    }

    /// Sum of the local statistics over units with a defined value.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.records
            .iter()
            .filter(|r| r.status != LocalStatus::Undefined)
            .map(|r| r.i)
            .sum()
    }

    /// Units whose analytical p-value clears `threshold`.
    pub fn significant(&self, threshold: f64) -> impl Iterator<Item = &LocalMoranRecord> {
        self.records
            .iter()
            .filter(move |r| r.is_significant(threshold))
    }

    /// Records keyed by unit key.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, LocalMoranRecord> {
        self.records
            .into_iter()
            .map(|r| (r.key.clone(), r))
            .collect()
    }
}

/// Computes local Moran's I for `values`, positionally aligned with
/// `weights`.
///
/// Weights are normally row-standardized; other styles are accepted and
/// keep the decomposition exact, but the quadrant lag is then a weighted
/// sum rather than a weighted mean.
///
/// # Errors
///
/// * [`StatsError::PreconditionViolation`] on a length mismatch, fewer
///   than three units, a non-finite value, zero variance or weights without
///   any link
#[allow(clippy::similar_names)]
pub fn local_moran(
    values: &[f64],
    weights: &SpatialWeights,
    options: &LocalMoranOptions,
) -> Result<LocalMoran, StatsError> {
    let centered = Centered::new(values, weights)?;
    let s0 = weights.s0();
    if s0 <= 0.0 {
        return Err(StatsError::precondition(
            "spatial weights contain no links",
        ));
    }

    let islands = weights.islands().len();
    if islands > 0 {
        log::warn!("{islands} unit(s) have no neighbors; their local Moran's I is undefined");
    }

    let n = centered.n();
    let m2 = centered.sum_sq / n;
    let b2 = match options.null_model {
        NullModel::Randomization => centered.kurtosis,
        NullModel::Normality => 3.0,
    };
    let scale = 1.0 / (m2 * s0);
    let d = &centered.deviations;

    let records: Vec<LocalMoranRecord> = (0..weights.len())
        .into_par_iter()
        .map(|i| {
            let key = weights.key(i).to_string();
            let d_i = d[i];

            if weights.is_island(i) {
                return LocalMoranRecord {
                    key,
                    value: values[i],
                    centered: d_i,
                    lag: f64::NAN,
                    i: f64::NAN,
                    expected: f64::NAN,
                    variance: f64::NAN,
                    z_score: f64::NAN,
                    p_value: f64::NAN,
                    p_sim: None,
                    quadrant: None,
                    status: LocalStatus::Undefined,
                };
            }

            let lag: f64 = weights.row(i).map(|(j, w)| w * d[j]).sum();

            // Moments of the off-diagonal links. A self link puts d_i^2 in
            // the product and is added separately below.
            let w_ii = weights.weight(i, i);
            let (w_i, w_i2) = weights
                .row(i)
                .filter(|&(j, _)| j != i)
                .fold((0.0, 0.0), |(s, sq), (_, w)| (s + w, sq + w * w));

            let cross_mean = -w_i / (n - 1.0);
            let cross_var = w_i2 * (n - b2) / (n - 1.0)
                + (w_i * w_i - w_i2) * (2.0 * b2 - n) / ((n - 1.0) * (n - 2.0))
                - cross_mean * cross_mean;

            let expected_a = w_ii + cross_mean;
            let variance_a = cross_var + w_ii * w_ii * (b2 - 1.0)
                - 2.0 * w_ii * w_i * (b2 - 1.0) / (n - 1.0);

            let i_stat = d_i * lag * scale;
            let expected = expected_a / s0;
            let variance = variance_a / (s0 * s0);

            let (z_score, status) = if variance > 0.0 {
                ((i_stat - expected) / variance.sqrt(), LocalStatus::Valid)
            } else {
                (f64::NAN, LocalStatus::Degenerate)
            };

            let p_sim = (options.permutations > 0).then(|| {
                let simulated =
                    local_moran_simulations(i, d, weights, scale, options.permutations, options.seed);
                folded_pseudo_p(i_stat, &simulated)
            });

            LocalMoranRecord {
                key,
                value: values[i],
                centered: d_i,
                lag,
                i: i_stat,
                expected,
                variance,
                z_score,
                p_value: two_sided_p(z_score),
                p_sim,
                quadrant: Quadrant::classify(d_i, lag),
                status,
            }
        })
        .collect();

    log::debug!(
        "local Moran's I over {} units ({} null, {} permutations): sum = {:.6}",
        records.len(),
        options.null_model,
        options.permutations,
        records
            .iter()
            .filter(|r| r.status != LocalStatus::Undefined)
            .map(|r| r.i)
            .sum::<f64>()
    );

    Ok(LocalMoran {
        records,
        null_model: options.null_model,
        mean: centered.mean,
    })
}

/// Keyed form of [`local_moran`]: aligns `attribute` to the weights' units
/// by key and returns records keyed the same way.
///
/// # Errors
///
/// * [`StatsError::PreconditionViolation`] if a unit has no attribute
///   value, or for any reason [`local_moran`] fails
pub fn local_association(
    attribute: &BTreeMap<String, f64>,
    weights: &SpatialWeights,
    options: &LocalMoranOptions,
) -> Result<BTreeMap<String, LocalMoranRecord>, StatsError> {
    let values = weights.align(attribute)?;
    Ok(local_moran(&values, weights, options)?.into_map())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("tract-{i}")).collect()
    }

    /// Row-standardized weights with uneven neighbor counts.
    fn chain() -> SpatialWeights {
        SpatialWeights::from_adjacency(keys(6), &[
            vec![1, 2],
            vec![0, 2, 3],
            vec![0, 4],
            vec![1, 5],
            vec![2],
            vec![3],
        ])
        .unwrap()
        .row_standardized()
    }

    const VALUES: [f64; 6] = [3.0, 7.0, 1.0, 9.0, 4.0, 6.0];

    /// Calls `visit` with every permutation of `items` (Heap's algorithm).
    fn for_each_permutation(items: &mut [f64], k: usize, visit: &mut impl FnMut(&[f64])) {
        if k <= 1 {
            visit(items);
            return;
        }
        for i in 0..k - 1 {
            for_each_permutation(items, k - 1, visit);
            if k % 2 == 0 {
                items.swap(i, k - 1);
            } else {
                items.swap(0, k - 1);
            }
        }
        for_each_permutation(items, k - 1, visit);
    }

    /// Checks every unit's analytical moments against the mean and variance
    /// of its local statistic over all 720 permutations of `VALUES`.
    fn assert_moments_match_enumeration(weights: &SpatialWeights) {
        let observed = local_moran(&VALUES, weights, &LocalMoranOptions::default()).unwrap();

        for unit in 0..VALUES.len() {
            let mut samples = Vec::new();
            let mut items = VALUES;
            for_each_permutation(&mut items, VALUES.len(), &mut |perm| {
                let result = local_moran(perm, weights, &LocalMoranOptions::default()).unwrap();
                samples.push(result.records[unit].i);
            });

            assert_eq!(samples.len(), 720);
            let count = 720.0;
            let mean = samples.iter().sum::<f64>() / count;
            let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / count;

            let record = &observed.records[unit];
            assert!(
                (record.expected - mean).abs() < 1e-10,
                "unit {unit}: E = {} vs {mean}",
                record.expected
            );
            assert!(
                (record.variance - variance).abs() < 1e-10,
                "unit {unit}: Var = {} vs {variance}",
                record.variance
            );
        }
    }

    #[test]
    fn moments_match_exhaustive_randomization() {
        assert_moments_match_enumeration(&chain());
    }

    #[test]
    fn moments_match_exhaustive_randomization_with_self_links() {
        let weights = chain().with_self();
        assert!((0..weights.len()).all(|i| weights.has_self(i)));
        assert_moments_match_enumeration(&weights);

        let result = local_moran(&VALUES, &weights, &LocalMoranOptions::default()).unwrap();
        // row of 3 links incl. self, S0 = 6: (1/3 - (2/3)/5) / 6
        assert!((result.records[0].expected - 1.0 / 30.0).abs() < 1e-12);
        // leaf with one neighbor: (1/2 - (1/2)/5) / 6
        assert!((result.records[4].expected - 1.0 / 15.0).abs() < 1e-12);
    }

    #[test]
    fn normality_uses_normal_kurtosis() {
        let weights = chain();
        let options = LocalMoranOptions {
            null_model: NullModel::Normality,
            ..LocalMoranOptions::default()
        };
        let normal = local_moran(&VALUES, &weights, &options).unwrap();
        let random = local_moran(&VALUES, &weights, &LocalMoranOptions::default()).unwrap();

        for (a, b) in normal.iter().zip(random.iter()) {
            assert!((a.i - b.i).abs() < 1e-15);
            assert!((a.expected - b.expected).abs() < 1e-15);
        }
        assert!(
            normal
                .iter()
                .zip(random.iter())
                .any(|(a, b)| (a.variance - b.variance).abs() > 1e-6)
        );
    }

    #[test]
    fn toy_graph_with_island() {
        let weights = SpatialWeights::from_adjacency(keys(3), &[vec![1], vec![0], vec![]])
            .unwrap()
            .row_standardized();
        let result =
            local_moran(&[10.0, 10.0, 5.0], &weights, &LocalMoranOptions::default()).unwrap();

        let global = crate::global_moran(&[10.0, 10.0, 5.0], &weights, NullModel::Normality)
            .unwrap();
        assert!((global.i - 0.5).abs() < 1e-12);

        assert!((result.records[0].i - 0.25).abs() < 1e-12);
        assert!((result.records[1].i - 0.25).abs() < 1e-12);
        assert!((result.total() - global.i).abs() < 1e-12);

        let island = &result.records[2];
        assert_eq!(island.status, LocalStatus::Undefined);
        assert!(island.i.is_nan());
        assert!(island.lag.is_nan());
        assert!(island.p_value.is_nan());
        assert_eq!(island.quadrant, None);

        assert_eq!(result.records[0].quadrant, Some(Quadrant::HighHigh));
    }

    #[test]
    fn island_does_not_spoil_other_units() {
        let weights = SpatialWeights::from_adjacency(keys(7), &[
            vec![1, 2],
            vec![0, 2, 3],
            vec![0, 4],
            vec![1, 5],
            vec![2],
            vec![3],
            vec![],
        ])
        .unwrap()
        .row_standardized();

        let result = local_moran(
            &[3.0, 7.0, 1.0, 9.0, 4.0, 6.0, 5.0],
            &weights,
            &LocalMoranOptions::default(),
        )
        .unwrap();

        assert_eq!(result.records[6].status, LocalStatus::Undefined);
        for record in &result.records[..6] {
            assert_eq!(record.status, LocalStatus::Valid);
            assert!(record.p_value.is_finite());
            assert!((0.0..=1.0).contains(&record.p_value));
        }
    }

    #[test]
    fn rejects_zero_variance() {
        assert!(matches!(
            local_moran(&[4.0; 6], &chain(), &LocalMoranOptions::default()),
            Err(StatsError::PreconditionViolation { .. })
        ));
    }

    #[test]
    fn shifted_values_give_the_same_statistics() {
        let path = SpatialWeights::from_adjacency(keys(4), &[
            vec![1],
            vec![0, 2],
            vec![1, 3],
            vec![2],
        ])
        .unwrap()
        .row_standardized();

        let base = local_moran(&[0.0, 1.0, 2.0, 3.0], &path, &LocalMoranOptions::default())
            .unwrap();
        let shifted = local_moran(
            &[1e8, 1e8 + 1.0, 1e8 + 2.0, 1e8 + 3.0],
            &path,
            &LocalMoranOptions::default(),
        )
        .unwrap();

        assert!((base.total() - 0.4).abs() < 1e-12);
        assert!((shifted.total() - 0.4).abs() < 1e-9);
        for (a, b) in base.iter().zip(shifted.iter()) {
            assert!((a.i - b.i).abs() < 1e-9);
            assert!((a.z_score - b.z_score).abs() < 1e-9);
            assert_eq!(a.quadrant, b.quadrant);
        }
    }

    #[test]
    fn rejects_length_mismatch() {
        assert!(matches!(
            local_moran(&[1.0, 2.0, 3.0], &chain(), &LocalMoranOptions::default()),
            Err(StatsError::PreconditionViolation { .. })
        ));
    }

    #[test]
    fn permutations_are_deterministic() {
        let options = LocalMoranOptions {
            permutations: 199,
            seed: 42,
            ..LocalMoranOptions::default()
        };

        let a = local_moran(&VALUES, &chain(), &options).unwrap();
        let b = local_moran(&VALUES, &chain(), &options).unwrap();
        assert_eq!(a, b);

        for record in a.iter() {
            let p_sim = record.p_sim.unwrap();
            assert!(p_sim > 0.0 && p_sim <= 0.5 + 1.0 / 200.0, "p_sim = {p_sim}");
        }
    }

    #[test]
    fn keyed_interface_aligns_by_key() {
        let weights = chain();
        let attribute: BTreeMap<String, f64> = keys(6)
            .into_iter()
            .zip(VALUES)
            .rev()
            .collect();

        let keyed = local_association(&attribute, &weights, &LocalMoranOptions::default()).unwrap();
        let positional = local_moran(&VALUES, &weights, &LocalMoranOptions::default()).unwrap();

        for record in positional.iter() {
            assert_eq!(&keyed[&record.key], record);
        }

        let mut missing = attribute;
        missing.remove("tract-3");
        assert!(matches!(
            local_association(&missing, &weights, &LocalMoranOptions::default()),
            Err(StatsError::PreconditionViolation { .. })
        ));
    }
}
