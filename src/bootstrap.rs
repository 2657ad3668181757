use crate::config::VarianceModel;
use crate::context::TestContext;
use crate::significance::P_VALUE_FLOOR;
use rand::Rng;

/// Iterations that must run before early stopping is considered.
pub const MIN_ITERATIONS_BEFORE_STOP: usize = 10;

/// Constant of the sequential stopping boundary
/// (a = 5, theta = 0.6, delta = 0.400726, p0 = 0.05).
const BOUNDARY_C: f64 = 0.0737224;
const BOUNDARY_A: f64 = 5.0;

/// Replicates this close below the observed statistic, relative to it,
/// count as ties.
const TIE_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BootstrapOutcome {
    pub p_value: f64,
    pub iterations: usize,
    pub successes: usize,
    pub stopped_early: bool,
}

/// Sequential boundary after `k` iterations: 5 / ((k + c) * (1 + c)).
pub fn stopping_boundary(k: usize) -> f64 {
    BOUNDARY_A / ((k as f64 + BOUNDARY_C) * (1.0 + BOUNDARY_C))
}

/// Whether the running estimate is far enough above the boundary to stop.
pub fn should_stop(successes: usize, iterations: usize) -> bool {
    iterations > MIN_ITERATIONS_BEFORE_STOP
        && successes as f64 / iterations as f64 > stopping_boundary(iterations)
}

/// Empirical p-value of the observed statistic of `context`.
///
/// The null distribution is estimated by redrawing the per-group
/// contributions: a bootstrap within cases and within controls for the RVS
/// model, a permutation of dosages for the naive model. Each of up to `nboot` iterations regenerates the group contributions and
/// counts a success when (sum score)^2 / (sum variance) reaches the observed
/// statistic, up to rounding. Returns (successes + 1) / (iterations + 1). A replicate with
/// zero variance counts as a statistic of 0.
///
/// With `stop_early`, iteration stops once more than 10 iterations have run
/// and the success fraction exceeds [`stopping_boundary`].
pub fn bootstrap_test<R: Rng + ?Sized>(
    context: &mut TestContext,
    model: VarianceModel,
    nboot: usize,
    stop_early: bool,
    rng: &mut R,
) -> BootstrapOutcome {
    let tobs = context.observed_statistic(model);
    if !tobs.is_finite() {
        return BootstrapOutcome {
            p_value: P_VALUE_FLOOR,
            iterations: 0,
            successes: 0,
            stopped_early: false,
        };
    }

    let mut successes = 0;
    let mut iterations = 0;
    let mut stopped_early = false;

    while iterations < nboot {
        iterations += 1;

        let (score, variance) = context
            .regenerate(model, rng)
            .iter()
            .fold((0.0, 0.0), |(s, v), g| (s + g.score, v + g.variance));
        let mut statistic = score * score / variance;
        if !statistic.is_finite() {
            statistic = 0.0;
        }
        if statistic >= tobs * (1.0 - TIE_TOLERANCE) {
            successes += 1;
        }

        if stop_early && should_stop(successes, iterations) {
            log::debug!(
                "{}: early stop after {} iterations ({} successes)",
                context.variant(),
                iterations,
                successes
            );
            stopped_early = true;
            break;
        }
    }

    BootstrapOutcome {
        p_value: (successes as f64 + 1.0) / (iterations as f64 + 1.0),
        iterations,
        successes,
        stopped_early,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::significance::asymptotic_test;
    use crate::types::{Group, Variant};
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Deterministic dosages with a mild case/control shift.
    fn shifted_variant(n_per_arm: usize, shift: f64) -> (Vec<bool>, Variant) {
        let mut phenotypes = Vec::new();
        let mut dosages = Vec::new();
        for i in 0..n_per_arm {
            let base = (i % 3) as f64;
            phenotypes.push(true);
            dosages.push(Some((base + shift).min(2.0)));
            phenotypes.push(false);
            dosages.push(Some(base));
        }
        (phenotypes, Variant::new("chr3", 42, dosages, [4.0 / 9.0, 4.0 / 9.0, 1.0 / 9.0]))
    }

    #[test]
    fn test_boundary_values() {
        assert_relative_eq!(stopping_boundary(11), 5.0 / (11.0737224 * 1.0737224), epsilon = 1e-12);
        assert!(stopping_boundary(100) < stopping_boundary(20));
        assert!(!should_stop(10, 10));
        assert!(should_stop(11, 11));
        assert!(!should_stop(0, 50));
    }

    #[test]
    fn test_identical_arms_give_large_p() {
        let (phenotypes, variant) = shifted_variant(20, 0.0);
        let mut ctx = TestContext::new(&variant, &phenotypes, &[]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let out = bootstrap_test(&mut ctx, VarianceModel::Rvs, 100, false, &mut rng);
        assert_eq!(out.iterations, 100);
        assert!(!out.stopped_early);
        assert!(out.p_value >= 2.0 / 101.0);
        assert!(out.p_value > 0.5);
    }

    #[test]
    fn test_p_value_never_zero() {
        let (phenotypes, variant) = shifted_variant(30, 1.0);
        let mut ctx = TestContext::new(&variant, &phenotypes, &[]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let out = bootstrap_test(&mut ctx, VarianceModel::Naive, 200, false, &mut rng);
        assert!(out.p_value >= 1.0 / 201.0);
        assert_relative_eq!(
            out.p_value,
            (out.successes as f64 + 1.0) / (out.iterations as f64 + 1.0)
        );
    }

    #[test]
    fn test_permutation_converges_to_asymptotic() {
        let (phenotypes, variant) = shifted_variant(100, 0.35);
        let mut ctx = TestContext::new(&variant, &phenotypes, &[]).unwrap();
        let expected = asymptotic_test(&ctx, VarianceModel::Naive);
        assert!(expected > 0.01 && expected < 0.5, "asymptotic p = {}", expected);

        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let out = bootstrap_test(&mut ctx, VarianceModel::Naive, 20_000, false, &mut rng);
        assert_relative_eq!(out.p_value, expected, epsilon = 0.02);
    }

    #[test]
    fn test_early_stop_needs_eleven_iterations() {
        let (phenotypes, variant) = shifted_variant(20, 0.0);
        let mut ctx = TestContext::new(&variant, &phenotypes, &[]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        let out = bootstrap_test(&mut ctx, VarianceModel::Naive, 1000, true, &mut rng);
        assert!(out.stopped_early);
        assert!(out.iterations >= 11);
        assert!(out.iterations < 1000);
    }

    #[test]
    fn test_early_stop_keeps_decision() {
        for (shift, seed) in [(0.0, 4u64), (0.2, 5), (1.0, 6)] {
            let (phenotypes, variant) = shifted_variant(25, shift);
            let mut full_ctx = TestContext::new(&variant, &phenotypes, &[]).unwrap();
            let mut early_ctx = full_ctx.clone();

            let full = bootstrap_test(
                &mut full_ctx,
                VarianceModel::Rvs,
                500,
                false,
                &mut ChaCha8Rng::seed_from_u64(seed),
            );
            let early = bootstrap_test(
                &mut early_ctx,
                VarianceModel::Rvs,
                500,
                true,
                &mut ChaCha8Rng::seed_from_u64(seed),
            );

            if early.stopped_early {
                assert!(early.iterations >= 11);
            }
            assert_eq!(full.p_value < 0.05, early.p_value < 0.05, "shift {}", shift);
        }
    }

    #[test]
    fn test_permutation_counts_exact_ties() {
        // 2 cases, 8 controls; the observed case sum of 1 gives the smallest |score|,
        // so every permutation reaches the observed statistic
        let phenotypes: Vec<bool> = (0..10).map(|i| i < 2).collect();
        let dosages = [1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
            .iter()
            .map(|&d| Some(d))
            .collect();
        let variant = Variant::new("chr3", 77, dosages, [0.7, 0.3, 0.0]);
        let mut ctx = TestContext::new(&variant, &phenotypes, &[]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(12);

        let out = bootstrap_test(&mut ctx, VarianceModel::Naive, 500, false, &mut rng);
        assert_eq!(out.successes, out.iterations);
        assert_eq!(out.p_value, 1.0);
    }

    #[test]
    fn test_grouped_bootstrap_sums_group_replicates() {
        let (phenotypes, variant) = shifted_variant(20, 0.5);
        let groups = vec![
            Group { id: "low".into(), samples: (0..20).collect(), high_read_depth: false },
            Group { id: "high".into(), samples: (20..40).collect(), high_read_depth: true },
        ];
        let mut grouped = TestContext::new(&variant, &phenotypes, &groups).unwrap();
        let mut pooled = TestContext::new(&variant, &phenotypes, &[]).unwrap();

        for model in [VarianceModel::Rvs, VarianceModel::Naive] {
            let mut rng = ChaCha8Rng::seed_from_u64(21);
            let out = bootstrap_test(&mut grouped, model, 2000, false, &mut rng);
            assert_eq!(out.iterations, 2000);
            assert!(out.p_value > 0.0 && out.p_value <= 1.0);

            let mut rng = ChaCha8Rng::seed_from_u64(21);
            let alone = bootstrap_test(&mut pooled, model, 2000, false, &mut rng);
            // same data split in two strata: decisions agree
            assert_eq!(out.p_value < 0.05, alone.p_value < 0.05, "{:?}", model);
        }
    }

    #[test]
    fn test_degenerate_observed_statistic() {
        let phenotypes = vec![true, true, false, false];
        let variant = Variant::new("chr3", 7, vec![Some(1.0); 4], [0.0, 1.0, 0.0]);
        let mut ctx = TestContext::new(&variant, &phenotypes, &[]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let out = bootstrap_test(&mut ctx, VarianceModel::Naive, 50, false, &mut rng);
        assert_eq!(out.p_value, P_VALUE_FLOOR);
        assert_eq!(out.iterations, 0);
    }

    #[test]
    fn test_fewer_iterations_than_stop_minimum() {
        let (phenotypes, variant) = shifted_variant(10, 0.0);
        let mut ctx = TestContext::new(&variant, &phenotypes, &[]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let out = bootstrap_test(&mut ctx, VarianceModel::Rvs, 5, true, &mut rng);
        assert_eq!(out.iterations, 5);
        assert!(!out.stopped_early);
    }
}
