//! Conditional permutation inference for local statistics.
//!
//! For unit `i`, its own value is held fixed while the values placed on
//! its neighbors are drawn without replacement from the other `n - 1`
//! units. The pseudo p-value is folded: it counts simulations at least as
//! extreme as the observation on whichever side the observation falls.
//!
//! Every unit draws from its own generator seeded from the run seed and
//! the unit index, so results do not depend on how units are scheduled
//! across threads.

use lisa_map_weights::SpatialWeights;
use rand::{SeedableRng, rngs::StdRng, seq::index::sample};

/// Default run seed.
pub const DEFAULT_SEED: u64 = 12345;

/// Generator for unit `i` of a run seeded with `seed`.
#[must_use]
pub fn unit_rng(seed: u64, i: usize) -> StdRng {
    let mixed = (i as u64)
        .wrapping_add(1)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15);
    StdRng::seed_from_u64(seed ^ mixed)
}

/// Folded pseudo p-value `(min(larger, m - larger) + 1) / (m + 1)`, where
/// `larger` counts simulated values `>= observed` among `m` simulations.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn folded_pseudo_p(observed: f64, simulated: &[f64]) -> f64 {
    let permutations = simulated.len();
    let mut larger = simulated.iter().filter(|&&s| s >= observed).count();
    if permutations - larger < larger {
        larger = permutations - larger;
    }
    (larger as f64 + 1.0) / (permutations as f64 + 1.0)
}

/// Simulated local Moran values for unit `i` under conditional
/// randomization.
///
/// `scale` converts `d_i * lag_i` into the reported statistic. A self link
/// keeps its weight on `d_i`; only the other links receive drawn values.
pub(crate) fn local_moran_simulations(
    i: usize,
    deviations: &[f64],
    weights: &SpatialWeights,
    scale: f64,
    permutations: usize,
    seed: u64,
) -> Vec<f64> {
    let n = deviations.len();
    let d_i = deviations[i];
    let self_weight = weights.weight(i, i);
    let links: Vec<f64> = weights
        .row(i)
        .filter(|&(j, _)| j != i)
        .map(|(_, w)| w)
        .collect();

    let mut rng = unit_rng(seed, i);
    let mut simulated = Vec::with_capacity(permutations);

    for _ in 0..permutations {
        let drawn = sample(&mut rng, n - 1, links.len());
        let lag: f64 = self_weight * d_i
            + drawn
                .iter()
                .zip(&links)
                .map(|(k, w)| {
                    // skip over unit i itself
                    let j = if k >= i { k + 1 } else { k };
                    w * deviations[j]
                })
                .sum::<f64>();
        simulated.push(d_i * lag * scale);
    }

    simulated
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn folded_p_uses_smaller_tail() {
        let simulated: Vec<f64> = (0..99).map(f64::from).collect();
        // 1 simulation >= 98 on the upper tail
        assert!((folded_pseudo_p(98.0, &simulated) - 2.0 / 100.0).abs() < 1e-12);
        // 99 simulations >= -1, folded to 0
        assert!((folded_pseudo_p(-1.0, &simulated) - 1.0 / 100.0).abs() < 1e-12);
        // middle of the distribution
        assert!(folded_pseudo_p(49.0, &simulated) > 0.45);
    }

    #[test]
    fn unit_streams_are_reproducible_and_distinct() {
        let a: u64 = unit_rng(7, 3).r#gen();
        let b: u64 = unit_rng(7, 3).r#gen();
        let c: u64 = unit_rng(7, 4).r#gen();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn simulations_never_draw_the_unit_itself() {
        let keys = (0..4).map(|i| i.to_string()).collect();
        let weights =
            SpatialWeights::from_adjacency(keys, &[vec![1, 2, 3], vec![0], vec![0], vec![0]])
                .unwrap();
        // Only unit 0 is non-zero, so any draw of unit 0 onto its own links
        // would show up as a non-zero product.
        let deviations = [1.0, 0.0, 0.0, 0.0];

        let simulated = local_moran_simulations(0, &deviations, &weights, 1.0, 50, 1);
        assert_eq!(simulated.len(), 50);
        assert!(simulated.iter().all(|s| s.abs() < f64::EPSILON));
    }
}
