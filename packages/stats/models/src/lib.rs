#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Result types for local spatial association statistics.
//!
//! These types are produced by the `lisa_map_stats` engines and consumed by
//! whatever joins them back onto geometry (a choropleth layer, a CSV export,
//! a tile generator). Every per-unit record carries the unit key it was
//! computed for so that consumers can join by key rather than by position.
//!
//! Per-unit values that are undefined (isolated units) or degenerate (zero
//! variance under the null hypothesis) are stored as `NaN` and flagged with
//! a [`LocalStatus`]. `serde_json` writes `NaN` as `null`.

use serde::{Deserialize, Serialize};

/// Null hypothesis used to derive analytical moments.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullModel {
    /// Values are a random permutation of the observed values.
    #[default]
    Randomization,
    /// Values are independent draws from a normal distribution.
    Normality,
}

impl std::fmt::Display for NullModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Randomization => write!(f, "randomization"),
            Self::Normality => write!(f, "normality"),
        }
    }
}

/// Which member of the Getis-Ord family to compute.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GetisOrdVariant {
    /// `G*_i`: the unit's own value counts toward its local total.
    #[default]
    GStar,
    /// `G_i`: the unit's own value is excluded.
    ///
    /// Kept for compatibility with the literature. A unit's neighborhood
    /// total without the unit itself is rarely what a concentration map
    /// should show, so prefer [`Self::GStar`].
    G,
}

impl std::fmt::Display for GetisOrdVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GStar => write!(f, "G*"),
            Self::G => write!(f, "G"),
        }
    }
}

/// Local Moran quadrant, derived from the signs of the centered value and
/// its spatial lag. Independent of significance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quadrant {
    /// Above-mean unit surrounded by above-mean neighbors.
    #[serde(rename = "HH")]
    HighHigh,
    /// Below-mean unit surrounded by below-mean neighbors.
    #[serde(rename = "LL")]
    LowLow,
    /// Any other sign combination (spatial outliers and zero ties).
    #[serde(rename = "HL/LH")]
    Mixed,
}

impl Quadrant {
    /// Classifies a (centered value, spatial lag) pair.
    ///
    /// Returns `None` when either input is `NaN` (e.g. the lag of an
    /// isolated unit).
    #[must_use]
    pub fn classify(centered: f64, lag: f64) -> Option<Self> {
        if centered.is_nan() || lag.is_nan() {
            return None;
        }

        Some(if centered > 0.0 && lag > 0.0 {
            Self::HighHigh
        } else if centered < 0.0 && lag < 0.0 {
            Self::LowLow
        } else {
            Self::Mixed
        })
    }
}

impl std::fmt::Display for Quadrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HighHigh => write!(f, "HH"),
            Self::LowLow => write!(f, "LL"),
            Self::Mixed => write!(f, "HL/LH"),
        }
    }
}

/// Getis-Ord concentration classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcentrationType {
    /// Significantly more mass than expected (hot spot).
    High,
    /// Significantly less mass than expected (cold spot).
    Low,
    /// Not significant at the threshold, or undefined.
    NotSignificant,
}

impl ConcentrationType {
    /// Classifies a standardized statistic against a significance threshold.
    ///
    /// `NaN` inputs never clear the threshold.
    #[must_use]
    pub fn classify(z_score: f64, p_value: f64, threshold: f64) -> Self {
        if p_value <= threshold {
            if z_score > 0.0 {
                return Self::High;
            }
            if z_score < 0.0 {
                return Self::Low;
            }
        }
        Self::NotSignificant
    }
}

impl std::fmt::Display for ConcentrationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Low => write!(f, "low"),
            Self::NotSignificant => write!(f, "not_significant"),
        }
    }
}

/// Per-unit outcome of a local statistic.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalStatus {
    /// All fields are finite.
    #[default]
    Valid,
    /// The unit has no neighbors, so its local value is undefined.
    Undefined,
    /// The null-hypothesis variance is zero, so no z-score or p-value exists.
    Degenerate,
}

impl LocalStatus {
    /// Whether the record carries a usable z-score and p-value.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl std::fmt::Display for LocalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Undefined => write!(f, "undefined"),
            Self::Degenerate => write!(f, "degenerate"),
        }
    }
}

/// Local Moran's I for a single areal unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalMoranRecord {
    /// Unit key (e.g. a tract GEOID).
    pub key: String,
    /// Observed attribute value.
    pub value: f64,
    /// Attribute value minus the attribute mean.
    pub centered: f64,
    /// Weighted sum of the neighbors' centered values.
    pub lag: f64,
    /// Local statistic. Summed over all units it equals the global I.
    pub i: f64,
    /// Expected value of `i` under the null model.
    pub expected: f64,
    /// Variance of `i` under the null model.
    pub variance: f64,
    /// Standardized statistic.
    pub z_score: f64,
    /// Two-sided p-value from the standard normal.
    pub p_value: f64,
    /// Folded pseudo p-value from conditional permutations, if requested.
    pub p_sim: Option<f64>,
    /// Quadrant of the Moran scatterplot. `None` for isolated units.
    pub quadrant: Option<Quadrant>,
    /// Per-unit outcome.
    pub status: LocalStatus,
}

impl LocalMoranRecord {
    /// Whether the analytical p-value clears `threshold`.
    #[must_use]
    pub fn is_significant(&self, threshold: f64) -> bool {
        self.p_value <= threshold
    }

    /// Quadrant, only when the unit is significant at `threshold`.
    #[must_use]
    pub fn cluster(&self, threshold: f64) -> Option<Quadrant> {
        if self.is_significant(threshold) {
            self.quadrant
        } else {
            None
        }
    }
}

/// Getis-Ord concentration for a single areal unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcentrationRecord {
    /// Unit key (e.g. a tract GEOID).
    pub key: String,
    /// Observed attribute value.
    pub value: f64,
    /// Share of the region's total found in the neighborhood.
    ///
    /// Diagnostic only; the standardized `z_score` is the reported measure.
    pub statistic: f64,
    /// Expected share under spatial randomness.
    pub expected: f64,
    /// Variance of the share under spatial randomness.
    pub variance: f64,
    /// Standardized statistic.
    pub z_score: f64,
    /// Two-sided p-value from the standard normal.
    pub p_value: f64,
    /// Hot/cold spot classification at the run's threshold.
    pub concentration: ConcentrationType,
    /// Per-unit outcome.
    pub status: LocalStatus,
}

/// Global Moran's I for a whole attribute vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalMoranResult {
    /// Moran's I statistic.
    pub i: f64,
    /// Expected I under the null, `-1/(n-1)`.
    pub expected: f64,
    /// Variance of I under the null model.
    pub variance: f64,
    /// Standardized statistic.
    pub z_score: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// Null model the moments were derived from.
    pub null_model: NullModel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadrant_signs() {
        assert_eq!(Quadrant::classify(1.0, 2.0), Some(Quadrant::HighHigh));
        assert_eq!(Quadrant::classify(-1.0, -0.5), Some(Quadrant::LowLow));
        assert_eq!(Quadrant::classify(1.0, -2.0), Some(Quadrant::Mixed));
        assert_eq!(Quadrant::classify(-1.0, 2.0), Some(Quadrant::Mixed));
        assert_eq!(Quadrant::classify(0.0, 2.0), Some(Quadrant::Mixed));
        assert_eq!(Quadrant::classify(1.0, f64::NAN), None);
    }

    #[test]
    fn concentration_requires_significance() {
        assert_eq!(
            ConcentrationType::classify(2.5, 0.01, 0.05),
            ConcentrationType::High
        );
        assert_eq!(
            ConcentrationType::classify(-2.5, 0.01, 0.05),
            ConcentrationType::Low
        );
        assert_eq!(
            ConcentrationType::classify(2.5, 0.01, 0.001),
            ConcentrationType::NotSignificant
        );
        assert_eq!(
            ConcentrationType::classify(f64::NAN, f64::NAN, 0.05),
            ConcentrationType::NotSignificant
        );
    }

    #[test]
    fn cluster_hides_insignificant_quadrant() {
        let record = LocalMoranRecord {
            key: "11001000100".to_string(),
            value: 10.0,
            centered: 2.0,
            lag: 1.0,
            i: 0.3,
            expected: -0.1,
            variance: 0.04,
            z_score: 2.0,
            p_value: 0.045,
            p_sim: None,
            quadrant: Some(Quadrant::HighHigh),
            status: LocalStatus::Valid,
        };

        assert_eq!(record.cluster(0.05), Some(Quadrant::HighHigh));
        assert_eq!(record.cluster(0.01), None);
    }

    #[test]
    fn serialized_labels() {
        assert_eq!(
            serde_json::to_string(&Quadrant::Mixed).unwrap(),
            "\"HL/LH\""
        );
        assert_eq!(
            serde_json::to_string(&GetisOrdVariant::GStar).unwrap(),
            "\"g-star\""
        );
        assert_eq!(
            serde_json::to_string(&ConcentrationType::NotSignificant).unwrap(),
            "\"not_significant\""
        );
    }
}
