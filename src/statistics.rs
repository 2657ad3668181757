use crate::config::VarianceModel;
use crate::error::AssocError;
use crate::types::{DosageSummary, Variant};

/// Robust variance of E(G | D) from the genotype frequencies.
///
/// var(G) = E(G^2) - E(G)^2 with p = [P(AA), P(Aa), P(aa)]
pub fn robust_var(p: &[f64; 3]) -> f64 {
    (4.0 * p[2] + p[1]) - (2.0 * p[2] + p[1]).powi(2)
}

/// Case/control blend of variances under the RVS model.
///
/// v = (1 - pi) * robust_var(p) + pi * control_var, pi = case fraction
pub fn mixed_variance(p: &[f64; 3], case_fraction: f64, control_var: f64) -> f64 {
    (1.0 - case_fraction) * robust_var(p) + case_fraction * control_var
}

/// Factor that rescales the naive score statistic to the RVS statistic.
pub fn adjustment_factor(var: f64, p: &[f64; 3], case_fraction: f64, control_var: f64) -> f64 {
    var / mixed_variance(p, case_fraction, control_var)
}

/// Variance of the score contributed by one group.
///
/// Naive: n * pi * (1 - pi) * var, which equals sum((y - ybar)^2) * var(x).
/// RVS: n * pi * (1 - pi) * ((1 - pi) * v_case + pi * control_var), where
/// v_case is `robust_var(p)` for low read depth and the observed case
/// variance when dosages come from high read depth.
pub fn score_variance(
    model: VarianceModel,
    summary: &DosageSummary,
    p: &[f64; 3],
    high_read_depth: bool,
) -> f64 {
    let pi = summary.case_fraction();
    let scale = summary.n * pi * (1.0 - pi);
    match model {
        VarianceModel::Naive => scale * summary.var,
        VarianceModel::Rvs => {
            let case_var = if high_read_depth {
                summary.case_var
            } else {
                robust_var(p)
            };
            scale * ((1.0 - pi) * case_var + pi * summary.control_var)
        }
    }
}

/// Score from the dosage sums of each arm.
///
/// sum((y - ybar) * x) = (1 - pi) * case_sum - pi * control_sum, pi = ybar
pub fn split_score(case_sum: f64, control_sum: f64, case_fraction: f64) -> f64 {
    (1.0 - case_fraction) * case_sum - case_fraction * control_sum
}

/// Score of one sample set: sum((y - ybar) * x) over non-missing dosages.
///
/// Accumulates the arm sums in sample order, the same way permutation
/// replicates do, so a replicate equal to the observed score compares equal.
pub fn score_contribution(dosages: &[Option<f64>], phenotypes: &[bool], samples: &[usize]) -> f64 {
    let mut case_sum = 0.0;
    let mut control_sum = 0.0;
    let mut n_case = 0.0;
    let mut n = 0.0;
    for &i in samples {
        if let Some(x) = dosages[i] {
            n += 1.0;
            if phenotypes[i] {
                n_case += 1.0;
                case_sum += x;
            } else {
                control_sum += x;
            }
        }
    }
    if n == 0.0 {
        return 0.0;
    }
    split_score(case_sum, control_sum, n_case / n)
}

/// Score test statistic for a single variant.
///
/// score = sum((y - ybar) * x)
/// statistic = score^2 / sum((y - ybar)^2 * var(x))
///
/// Only non-missing dosages take part; var(x) divides by n. Follows a
/// chi-squared distribution with one degree of freedom under the null.
pub fn score_statistic(phenotypes: &[bool], variant: &Variant) -> Result<f64, AssocError> {
    let x = &variant.dosages;
    if x.len() != phenotypes.len() {
        return Err(AssocError::LengthMismatch {
            variant: variant.label(),
            expected: phenotypes.len(),
            found: x.len(),
        });
    }

    let observed: Vec<(f64, f64)> = x
        .iter()
        .zip(phenotypes)
        .filter_map(|(xi, &yi)| xi.map(|v| (phenotype_value(yi), v)))
        .collect();
    if observed.is_empty() {
        return Err(AssocError::NoObservedDosages {
            variant: variant.label(),
        });
    }

    let n = observed.len() as f64;
    let ybar = observed.iter().map(|(y, _)| y).sum::<f64>() / n;
    let xbar = observed.iter().map(|(_, x)| x).sum::<f64>() / n;
    let xvar = observed.iter().map(|(_, x)| (x - xbar).powi(2)).sum::<f64>() / n;

    let mut score = 0.0;
    let mut denom = 0.0;
    for (y, x) in &observed {
        let r = y - ybar;
        score += r * x;
        denom += r * r * xvar;
    }

    Ok(score * score / denom)
}

#[inline]
fn phenotype_value(is_case: bool) -> f64 {
    if is_case {
        1.0
    } else {
        0.0
    }
}
