//! Getis-Ord local concentration.
//!
//! `G*_i` is the share of the region's total attribute mass found in unit
//! `i`'s neighborhood, the unit itself included:
//!
//! ```text
//! G*_i = sum_j w_ij x_j / sum_j x_j
//! ```
//!
//! `G_i` leaves the unit's own value out of the numerator. Unlike Moran's
//! I this measures mass, not similarity, so the attribute must be a
//! non-negative ratio-scale quantity (counts, rates, totals).
//!
//! Under spatial randomness the neighborhood sum is a sample without
//! replacement from the attribute values, which gives closed-form moments.
//! For `G*` the sample is drawn from all `n` values; for `G` from the
//! `n - 1` values other than the unit's own.

use std::collections::BTreeMap;

use lisa_map_weights::SpatialWeights;

use crate::correction::{DEFAULT_ALPHA, Significance};
use crate::maybe_rayon::*;
use crate::{
    ConcentrationRecord, ConcentrationType, GetisOrdVariant, LocalStatus, StatsError,
    check_values, two_sided_p,
};

/// Settings for a concentration run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcentrationOptions {
    /// `G*` (default) or `G`.
    pub variant: GetisOrdVariant,
    /// Nominal significance level.
    pub alpha: f64,
    /// Classify against the Bonferroni-corrected threshold instead of
    /// `alpha`.
    pub bonferroni: bool,
    /// Number of simultaneous tests. Defaults to the number of units.
    pub tests: Option<usize>,
}

impl Default for ConcentrationOptions {
    fn default() -> Self {
        Self {
            variant: GetisOrdVariant::GStar,
            alpha: DEFAULT_ALPHA,
            bonferroni: true,
            tests: None,
        }
    }
}

/// Getis-Ord concentration for every unit, in the weights' unit order.
#[derive(Debug, Clone, PartialEq)]
pub struct Concentration {
    /// One record per unit.
    pub records: Vec<ConcentrationRecord>,
    /// Variant computed.
    pub variant: GetisOrdVariant,
    /// Nominal and corrected thresholds of the run.
    pub significance: Significance,
    /// Threshold the classification was made at.
    pub threshold: f64,
}

impl Concentration {
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
    pub fn iter(&self) -> impl Iterator<Item = &ConcentrationRecord> {
        self.records.iter()
    }

    /// Units classified as `kind`.
    pub fn of_type(&self, kind: ConcentrationType) -> impl Iterator<Item = &ConcentrationRecord> {
        self.records.iter().filter(move |r| r.concentration == kind)
    }

    /// Records keyed by unit key.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, ConcentrationRecord> {
        self.records
            .into_iter()
            .map(|r| (r.key.clone(), r))
            .collect()
    }
}

/// Computes Getis-Ord concentration for `values`, positionally aligned with
/// binary `weights`.
///
/// For [`GetisOrdVariant::GStar`] each unit's own value always counts
/// toward its neighborhood, whether or not the weights carry a self link.
/// For [`GetisOrdVariant::G`] any self link is ignored.
///
/// Negative values violate the ratio-scale contract. They are not rejected,
/// but the resulting shares are meaningless and a warning is logged.
///
/// # Errors
///
/// * [`StatsError::PreconditionViolation`] on a length mismatch, a
///   non-finite value, non-binary weights, a zero total, too few units
///   for the variant, or an invalid significance level
#[allow(clippy::similar_names, clippy::cast_precision_loss, clippy::too_many_lines)]
pub fn getis_ord(
    values: &[f64],
    weights: &SpatialWeights,
    options: &ConcentrationOptions,
) -> Result<Concentration, StatsError> {
    check_values(values, weights)?;

    let min_units = match options.variant {
        GetisOrdVariant::GStar => 2,
        GetisOrdVariant::G => 3,
    };
    if values.len() < min_units {
        return Err(StatsError::precondition(format!(
            "{} needs at least {min_units} units, got {}",
            options.variant,
            values.len()
        )));
    }

    if !weights.is_binary() {
        return Err(StatsError::precondition(
            "Getis-Ord concentration requires binary weights",
        ));
    }

    let total: f64 = values.iter().sum();
    if total == 0.0 {
        return Err(StatsError::precondition(
            "attribute sums to zero; concentration shares are undefined",
        ));
    }

    let negatives = values.iter().filter(|&&v| v < 0.0).count();
    if negatives > 0 {
        log::warn!(
            "{negatives} negative attribute value(s); Getis-Ord expects a non-negative ratio-scale variable"
        );
    }

    if options.variant == GetisOrdVariant::G {
        log::debug!("computing G (self excluded); G* is usually the more meaningful measure");
    }

    let significance =
        Significance::bonferroni(options.alpha, options.tests.unwrap_or(values.len()))?;
    let threshold = if options.bonferroni {
        significance.corrected
    } else {
        significance.alpha
    };

    let n = values.len() as f64;
    let mean = total / n;
    let sum_sq_dev: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();

    let records: Vec<ConcentrationRecord> = (0..weights.len())
        .into_par_iter()
        .map(|i| {
            let x_i = values[i];
            let (others, linked) = weights
                .row(i)
                .filter(|&(j, _)| j != i)
                .fold((0.0, 0.0), |(sum, count), (j, _)| (sum + values[j], count + 1.0));

            // Population of values the neighborhood is drawn from, its size,
            // and the neighborhood sum and size.
            let (local, size, population, pop_mean, pop_var) = match options.variant {
                GetisOrdVariant::GStar => (x_i + others, linked + 1.0, n, mean, sum_sq_dev / n),
                GetisOrdVariant::G => {
                    let pop_mean = (total - x_i) / (n - 1.0);
                    let pop_ss = (sum_sq_dev
                        - (x_i - mean).powi(2)
                        - (n - 1.0) * (pop_mean - mean).powi(2))
                    .max(0.0);
                    (others, linked, n - 1.0, pop_mean, pop_ss / (n - 1.0))
                }
            };

            let statistic = local / total;
            let expected = size * pop_mean / total;
            let spread = size * (population - size) / (population - 1.0);
            let variance = spread * pop_var / (total * total);

            let (z_score, status) = if size == 0.0 {
                (f64::NAN, LocalStatus::Undefined)
            } else if spread * pop_var > 0.0 {
                (
                    (local - size * pop_mean) / (pop_var * spread).sqrt(),
                    LocalStatus::Valid,
                )
            } else {
                (f64::NAN, LocalStatus::Degenerate)
            };

            let p_value = two_sided_p(z_score);

            ConcentrationRecord {
                key: weights.key(i).to_string(),
                value: x_i,
                statistic: if status == LocalStatus::Undefined {
                    f64::NAN
                } else {
                    statistic
                },
                expected,
                variance,
                z_score,
                p_value,
                concentration: ConcentrationType::classify(z_score, p_value, threshold),
                status,
            }
        })
        .collect();

    log::debug!(
        "{} over {} units at threshold {threshold:.3e}: {} high, {} low",
        options.variant,
        records.len(),
        records
            .iter()
            .filter(|r| r.concentration == ConcentrationType::High)
            .count(),
        records
            .iter()
            .filter(|r| r.concentration == ConcentrationType::Low)
            .count()
    );

    Ok(Concentration {
        records,
        variant: options.variant,
        significance,
        threshold,
    })
}

/// Keyed form of [`getis_ord`]: aligns `attribute` to the weights' units by
/// key and returns records keyed the same way.
///
/// # Errors
///
/// * [`StatsError::PreconditionViolation`] if a unit has no attribute
///   value, or for any reason [`getis_ord`] fails
pub fn concentration(
    attribute: &BTreeMap<String, f64>,
    weights: &SpatialWeights,
    options: &ConcentrationOptions,
) -> Result<BTreeMap<String, ConcentrationRecord>, StatsError> {
    let values = weights.align(attribute)?;
    Ok(getis_ord(&values, weights, options)?.into_map())
}
