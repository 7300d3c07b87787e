//! Global Moran's I.
//!
//! `I = (n / S0) * sum_ij w_ij d_i d_j / sum_i d_i^2` with `d` the
//! mean-centered attribute. Moments follow Cliff & Ord under either
//! normality or randomization.

use lisa_map_weights::SpatialWeights;

use crate::{Centered, GlobalMoranResult, NullModel, StatsError, two_sided_p};

/// Computes global Moran's I with its null-hypothesis moments.
///
/// The randomization variance needs at least four units; with three it is
/// reported as `NaN`.
///
/// # Errors
///
/// * [`StatsError::PreconditionViolation`] on a length mismatch, a
///   non-finite value, zero variance, weights without any link or weights
///   with a self link
pub fn global_moran(
    values: &[f64],
    weights: &SpatialWeights,
    null_model: NullModel,
) -> Result<GlobalMoranResult, StatsError> {
    let centered = Centered::new(values, weights)?;
    let s0 = weights.s0();
    if s0 <= 0.0 {
        return Err(StatsError::precondition(
            "spatial weights contain no links",
        ));
    }

    if let Some(unit) = (0..weights.len()).find(|&i| weights.has_self(i)) {
        return Err(StatsError::precondition(format!(
            "global Moran's I moments assume no self links, but unit {} links to itself",
            weights.key(unit)
        )));
    }

    let d = &centered.deviations;
    let cross: f64 = (0..weights.len())
        .map(|i| d[i] * weights.row(i).map(|(j, w)| w * d[j]).sum::<f64>())
        .sum();

    let n = centered.n();
    let i = (n / s0) * cross / centered.sum_sq;
    let expected = -1.0 / (n - 1.0);

    let s1 = weights.s1();
    let s2 = weights.s2();
    let s0_sq = s0 * s0;

    let variance = match null_model {
        NullModel::Normality => {
            (n * n * s1 - n * s2 + 3.0 * s0_sq) / ((n * n - 1.0) * s0_sq) - expected * expected
        }
        NullModel::Randomization => {
            if weights.len() < 4 {
                f64::NAN
            } else {
                let b2 = centered.kurtosis;
                let numerator = n * ((n * n - 3.0 * n + 3.0) * s1 - n * s2 + 3.0 * s0_sq)
                    - b2 * ((n * n - n) * s1 - 2.0 * n * s2 + 6.0 * s0_sq);
                numerator / ((n - 1.0) * (n - 2.0) * (n - 3.0) * s0_sq) - expected * expected
            }
        }
    };

    let z_score = if variance > 0.0 {
        (i - expected) / variance.sqrt()
    } else {
        f64::NAN
    };

    log::debug!(
        "global Moran's I = {i:.6} (E = {expected:.6}, z = {z_score:.4}) over {} units",
        weights.len()
    );

    Ok(GlobalMoranResult {
        i,
        expected,
        variance,
        z_score,
        p_value: two_sided_p(z_score),
        null_model,
    })
}
