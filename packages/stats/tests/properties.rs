//! Property-based tests for the local statistics engines.
//!
//! Random attribute vectors run over random connected neighbor graphs
//! (a ring plus random chords), so every unit has at least two neighbors.

use lisa_map_stats::{
    ConcentrationOptions, GetisOrdVariant, LocalMoranOptions, LocalStatus, NullModel, Quadrant,
    Significance, getis_ord, global_moran, local_moran,
};
use lisa_map_weights::SpatialWeights;
use proptest::prelude::*;

/// Ring over `n` units plus the given chords, as binary weights.
fn ring_with_chords(n: usize, chords: &[(usize, usize)]) -> SpatialWeights {
    let mut adjacency: Vec<Vec<usize>> = (0..n)
        .map(|i| vec![(i + 1) % n, (i + n - 1) % n])
        .collect();
    for &(a, b) in chords {
        let (a, b) = (a % n, b % n);
        if a != b {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
    }
    let keys = (0..n).map(|i| format!("unit-{i}")).collect();
    SpatialWeights::from_adjacency(keys, &adjacency).unwrap()
}

fn has_variance(values: &[f64]) -> bool {
    values.iter().any(|v| (v - values[0]).abs() > 1e-3)
}

fn case() -> impl Strategy<Value = (Vec<f64>, Vec<(usize, usize)>)> {
    (5usize..40).prop_flat_map(|n| {
        (
            prop::collection::vec(0.0f64..1000.0, n),
            prop::collection::vec((0..n, 0..n), 0..n),
        )
    })
}

// =============================================================================
// Local Moran's I
// =============================================================================

proptest! {
    /// Local statistics sum to the global statistic.
    #[test]
    fn prop_local_sums_to_global((values, chords) in case()) {
        prop_assume!(has_variance(&values));
        let weights = ring_with_chords(values.len(), &chords).row_standardized();

        let local = local_moran(&values, &weights, &LocalMoranOptions::default()).unwrap();
        let global = global_moran(&values, &weights, NullModel::Randomization).unwrap();

        let tolerance = 1e-9 * global.i.abs().max(1.0);
        prop_assert!((local.total() - global.i).abs() < tolerance,
            "sum {} vs global {}", local.total(), global.i);
    }

    /// The decomposition holds for binary weights as well.
    #[test]
    fn prop_local_sums_to_global_binary((values, chords) in case()) {
        prop_assume!(has_variance(&values));
        let weights = ring_with_chords(values.len(), &chords);

        let local = local_moran(&values, &weights, &LocalMoranOptions::default()).unwrap();
        let global = global_moran(&values, &weights, NullModel::Normality).unwrap();

        let tolerance = 1e-9 * global.i.abs().max(1.0);
        prop_assert!((local.total() - global.i).abs() < tolerance);
    }

    /// Quadrants agree with the signs of the centered value and lag.
    #[test]
    fn prop_quadrant_follows_signs((values, chords) in case()) {
        prop_assume!(has_variance(&values));
        let weights = ring_with_chords(values.len(), &chords).row_standardized();
        let local = local_moran(&values, &weights, &LocalMoranOptions::default()).unwrap();

        for record in local.iter() {
            match record.quadrant {
                Some(Quadrant::HighHigh) => {
                    prop_assert!(record.centered > 0.0 && record.lag > 0.0);
                }
                Some(Quadrant::LowLow) => {
                    prop_assert!(record.centered < 0.0 && record.lag < 0.0);
                }
                Some(Quadrant::Mixed) => {
                    prop_assert!(!(record.centered > 0.0 && record.lag > 0.0));
                    prop_assert!(!(record.centered < 0.0 && record.lag < 0.0));
                }
                None => prop_assert!(false, "connected unit without a quadrant"),
            }
        }
    }

    /// Units significant after correction are significant before it.
    #[test]
    fn prop_corrected_subset_of_nominal(
        (values, chords) in case(),
        alpha in 0.001f64..0.5,
        extra_tests in 0usize..100,
    ) {
        prop_assume!(has_variance(&values));
        let weights = ring_with_chords(values.len(), &chords).row_standardized();
        let local = local_moran(&values, &weights, &LocalMoranOptions::default()).unwrap();

        let significance = Significance::bonferroni(alpha, values.len() + extra_tests).unwrap();
        let nominal: Vec<&str> = local
            .significant(significance.alpha)
            .map(|r| r.key.as_str())
            .collect();

        for record in local.significant(significance.corrected) {
            prop_assert!(nominal.contains(&record.key.as_str()));
        }
    }
}

// =============================================================================
// Getis-Ord
// =============================================================================

proptest! {
    /// For non-negative values the raw G* share lies in [0, 1].
    #[test]
    fn prop_g_star_share_is_bounded((values, chords) in case()) {
        prop_assume!(values.iter().sum::<f64>() > 0.0);
        let weights = ring_with_chords(values.len(), &chords);
        let result = getis_ord(&values, &weights, &ConcentrationOptions::default()).unwrap();

        for record in result.iter() {
            prop_assert!(record.statistic >= -1e-12 && record.statistic <= 1.0 + 1e-12,
                "share {}", record.statistic);
        }
    }

    /// With every unit linked to every other, the share is exactly 1.
    #[test]
    fn prop_full_region_share_is_one(values in prop::collection::vec(0.0f64..1000.0, 3..20)) {
        prop_assume!(values.iter().sum::<f64>() > 0.0);
        let n = values.len();
        let adjacency: Vec<Vec<usize>> = (0..n).map(|i| (0..n).filter(|&j| j != i).collect()).collect();
        let keys = (0..n).map(|i| i.to_string()).collect();
        let weights = SpatialWeights::from_adjacency(keys, &adjacency).unwrap().with_self();

        let result = getis_ord(&values, &weights, &ConcentrationOptions::default()).unwrap();
        for record in result.iter() {
            prop_assert!((record.statistic - 1.0).abs() < 1e-9);
            prop_assert_eq!(record.status, LocalStatus::Degenerate);
        }
    }

    /// Corrected classifications are a subset of nominal ones.
    #[test]
    fn prop_concentration_nesting((values, chords) in case(), variant_g in any::<bool>()) {
        prop_assume!(has_variance(&values));
        let weights = ring_with_chords(values.len(), &chords);
        let variant = if variant_g { GetisOrdVariant::G } else { GetisOrdVariant::GStar };

        let nominal = getis_ord(&values, &weights, &ConcentrationOptions {
            variant,
            bonferroni: false,
            ..ConcentrationOptions::default()
        }).unwrap();
        let corrected = getis_ord(&values, &weights, &ConcentrationOptions {
            variant,
            ..ConcentrationOptions::default()
        }).unwrap();

        for (a, b) in nominal.iter().zip(corrected.iter()) {
            if b.concentration != lisa_map_stats::ConcentrationType::NotSignificant {
                prop_assert_eq!(a.concentration, b.concentration);
            }
        }
    }
}
