use crate::config::VarianceModel;
use crate::context::TestContext;
use statrs::function::gamma::gamma;

/// Smallest p-value the engine reports. Degenerate statistics map here.
pub const P_VALUE_FLOOR: f64 = 1e-14;

const MAX_SERIES_TERMS: usize = 200;
const MIN_UPPER_TAIL: f64 = 1e-8;

/// Upper-tail probability of a chi-squared(1) statistic.
///
/// Uses the series of the regularized lower incomplete gamma function with
/// shape 1/2 at z = statistic / 2:
///
/// P(1/2, z) = 2 * sqrt(z) * exp(-z) / Gamma(1/2) * sum_k z^k / (1.5 * 2.5 * ... * (k + 0.5))
///
/// The series stops once the running sum no longer changes and is capped at
/// 200 terms. NaN, infinite or negative statistics, a series that has not
/// converged, and upper tails at or below 1e-8 all return `P_VALUE_FLOOR`.
pub fn chi_square_one_dof(statistic: f64) -> f64 {
    if !statistic.is_finite() || statistic < 0.0 {
        return P_VALUE_FLOOR;
    }

    let z = statistic * 0.5;
    let scale = 2.0 * z.sqrt() * (-z).exp();

    let mut sum = 1.0;
    let mut term = 1.0;
    let mut s = 0.5;
    let mut converged = false;
    for _ in 0..MAX_SERIES_TERMS {
        s += 1.0;
        term *= z / s;
        let next = sum + term;
        if next == sum {
            converged = true;
            break;
        }
        sum = next;
    }

    let cdf = sum * scale / gamma(0.5);
    if !converged || !cdf.is_finite() {
        return P_VALUE_FLOOR;
    }

    let upper = 1.0 - cdf;
    if upper <= MIN_UPPER_TAIL {
        P_VALUE_FLOOR
    } else {
        upper.min(1.0)
    }
}

/// Asymptotic score test for one variant.
///
/// Per-group scores and variances are summed, then
/// (sum score)^2 / (sum variance) is referred to chi-squared(1).
pub fn asymptotic_test(context: &TestContext, model: VarianceModel) -> f64 {
    chi_square_one_dof(context.observed_statistic(model))
}
