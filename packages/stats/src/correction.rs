//! Multiple-testing correction for per-unit significance tests.
//!
//! A local statistic runs one hypothesis test per unit. At a nominal level
//! of 0.05 a map of 1,000 tracts shows roughly 50 "significant" units by
//! chance alone. The Bonferroni threshold `alpha / m` bounds the
//! family-wise error rate instead.
//!
//! Anything significant at the corrected threshold is also significant at
//! the nominal one, so both can be reported side by side: nominal results
//! as the exploratory layer, corrected results as the high-confidence
//! filter on top.

use crate::StatsError;

/// Default nominal significance level.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Bonferroni-corrected threshold `alpha / m` for `m` simultaneous tests.
///
/// # Errors
///
/// * [`StatsError::PreconditionViolation`] if `alpha` is outside `(0, 1]`
///   or `m` is zero
#[allow(clippy::cast_precision_loss)]
pub fn bonferroni_threshold(alpha: f64, m: usize) -> Result<f64, StatsError> {
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(StatsError::precondition(format!(
            "significance level must be in (0, 1], got {alpha}"
        )));
    }
    if m == 0 {
        return Err(StatsError::precondition(
            "number of simultaneous tests must be at least 1",
        ));
    }

    Ok(alpha / m as f64)
}

/// Nominal and corrected thresholds for one run, computed once and applied
/// to every unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Significance {
    /// Nominal level.
    pub alpha: f64,
    /// Number of simultaneous tests the correction accounts for.
    pub tests: usize,
    /// `alpha / tests`.
    pub corrected: f64,
}

impl Significance {
    /// Thresholds for `tests` simultaneous tests at level `alpha`.
    ///
    /// # Errors
    ///
    /// * [`StatsError::PreconditionViolation`] as for
    ///   [`bonferroni_threshold`]
    pub fn bonferroni(alpha: f64, tests: usize) -> Result<Self, StatsError> {
        Ok(Self {
            alpha,
            tests,
            corrected: bonferroni_threshold(alpha, tests)?,
        })
    }

    /// Whether `p_value` clears the nominal level.
    #[must_use]
    pub fn is_nominal(&self, p_value: f64) -> bool {
        p_value <= self.alpha
    }

    /// Whether `p_value` clears the corrected level.
    #[must_use]
    pub fn is_corrected(&self, p_value: f64) -> bool {
        p_value <= self.corrected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divides_alpha_by_test_count() {
        assert!((bonferroni_threshold(0.05, 100).unwrap() - 0.0005).abs() < 1e-15);
        assert!((bonferroni_threshold(0.05, 1).unwrap() - 0.05).abs() < 1e-15);
    }

    #[test]
    fn rejects_invalid_inputs() {
        assert!(bonferroni_threshold(0.05, 0).is_err());
        assert!(bonferroni_threshold(0.0, 10).is_err());
        assert!(bonferroni_threshold(1.5, 10).is_err());
        assert!(bonferroni_threshold(f64::NAN, 10).is_err());
    }

    #[test]
    fn corrected_implies_nominal() {
        let significance = Significance::bonferroni(0.05, 20).unwrap();
        for p in [0.0, 0.001, 0.0025, 0.003, 0.04, 0.05, 0.2, f64::NAN] {
            if significance.is_corrected(p) {
                assert!(significance.is_nominal(p), "p = {p}");
            }
        }
        assert!(significance.is_corrected(0.002));
        assert!(!significance.is_corrected(0.003));
    }
}
