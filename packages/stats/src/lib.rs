#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Local spatial association statistics.
//!
//! Each engine takes an attribute vector aligned with a
//! [`SpatialWeights`] structure and returns one record per unit:
//!
//! * [`local_moran`]: additive decomposition of Moran's I with quadrant
//!   classification
//! * [`getis_ord`]: Getis-Ord `G*`/`G` concentration with hot/cold spot
//!   classification
//! * [`global_moran`]: the global statistic the local values sum to
//! * [`bonferroni_threshold`]: one corrected threshold for all units
//!
//! Problems with the input as a whole (length mismatch, zero variance,
//! zero total) fail the call with [`StatsError::PreconditionViolation`].
//! Problems with a single unit (no neighbors, zero null variance) are
//! reported inline through [`LocalStatus`] so that the rest of the batch
//! stays usable.

pub mod correction;
pub mod getis_ord;
pub mod global_moran;
pub mod local_moran;
mod maybe_rayon;
pub mod permutation;

use lisa_map_weights::SpatialWeights;
use thiserror::Error;

pub use correction::{Significance, bonferroni_threshold};
pub use getis_ord::{Concentration, ConcentrationOptions, concentration, getis_ord};
pub use global_moran::global_moran;
pub use lisa_map_stats_models::{
    ConcentrationRecord, ConcentrationType, GetisOrdVariant, GlobalMoranResult, LocalMoranRecord,
    LocalStatus, NullModel, Quadrant,
};
pub use local_moran::{LocalMoran, LocalMoranOptions, local_association, local_moran};

/// Errors that can occur while computing spatial statistics.
#[derive(Debug, Error)]
pub enum StatsError {
    /// The inputs as a whole cannot produce a meaningful result.
    #[error("Precondition violation: {message}")]
    PreconditionViolation {
        /// Description of what went wrong.
        message: String,
    },
}

impl StatsError {
    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionViolation {
            message: message.into(),
        }
    }
}

impl From<lisa_map_weights::WeightsError> for StatsError {
    fn from(e: lisa_map_weights::WeightsError) -> Self {
        Self::precondition(e.to_string())
    }
}

/// Two-sided p-value of a standard normal z-score, `2 * (1 - Phi(|z|))`.
///
/// Computed as `erfc(|z| / sqrt 2)` so that large z-scores keep their
/// precision instead of rounding `Phi` to 1. `NaN` stays `NaN`.
#[must_use]
pub fn two_sided_p(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    statrs::function::erf::erfc(z.abs() / std::f64::consts::SQRT_2)
}

/// Moments of a mean-centered attribute vector.
#[derive(Debug, Clone)]
pub(crate) struct Centered {
    pub mean: f64,
    pub deviations: Vec<f64>,
    /// Sum of squared deviations.
    pub sum_sq: f64,
    /// Sample kurtosis `m4 / m2^2`.
    pub kurtosis: f64,
}

impl Centered {
    /// Centers `values` after checking them against `weights`.
    ///
    /// # Errors
    ///
    /// * [`StatsError::PreconditionViolation`] on a length mismatch, fewer
    ///   than three units, a non-finite value or zero variance
    #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
    pub fn new(values: &[f64], weights: &SpatialWeights) -> Result<Self, StatsError> {
        check_values(values, weights)?;

        let n = values.len() as f64;
        if values.len() < 3 {
            return Err(StatsError::precondition(format!(
                "at least 3 units are required, got {}",
                values.len()
            )));
        }

        if values.iter().all(|&v| v == values[0]) {
            return Err(StatsError::precondition(
                "attribute has zero variance; spatial autocorrelation is undefined",
            ));
        }

        // Second pass corrects the rounding of the first mean, which matters
        // when the spread is small next to the magnitude of the values.
        let rough = values.iter().sum::<f64>() / n;
        let mean = rough + values.iter().map(|v| v - rough).sum::<f64>() / n;
        let deviations: Vec<f64> = values.iter().map(|v| v - mean).collect();
        let sum_sq: f64 = deviations.iter().map(|d| d * d).sum();

        let m2 = sum_sq / n;
        let m4 = deviations.iter().map(|d| d.powi(4)).sum::<f64>() / n;

        Ok(Self {
            mean,
            deviations,
            sum_sq,
            kurtosis: m4 / (m2 * m2),
        })
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn n(&self) -> f64 {
        self.deviations.len() as f64
    }
}

/// Checks that `values` align with `weights` and are all finite.
pub(crate) fn check_values(values: &[f64], weights: &SpatialWeights) -> Result<(), StatsError> {
    if values.len() != weights.len() {
        return Err(StatsError::precondition(format!(
            "attribute has {} values but the weights cover {} units",
            values.len(),
            weights.len()
        )));
    }

    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        return Err(StatsError::precondition(format!(
            "attribute value for unit {} is not finite",
            weights.key(i)
        )));
    }

    Ok(())
}
