use crate::config::VarianceModel;
use crate::error::AssocError;
use crate::statistics::{score_contribution, score_variance, split_score};
use crate::types::{DosageSummary, Group, Variant};
use rand::seq::SliceRandom;
use rand::Rng;

/// Score and score variance contributed by one group.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroupScore {
    pub score: f64,
    pub variance: f64,
}

#[derive(Debug, Clone)]
struct GroupData {
    summary: DosageSummary,
    high_read_depth: bool,
    score: f64,
    cases: Vec<f64>,    // case dosages minus the case mean
    controls: Vec<f64>, // control dosages minus the control mean
    pooled: Vec<f64>,   // non-missing dosages, permuted in place
    labels: Vec<bool>,  // case flag of each pooled slot
    draws: Vec<f64>,
}

impl GroupData {
    fn build(variant: &Variant, phenotypes: &[bool], group: &Group) -> Self {
        let summary = DosageSummary::from_samples(&variant.dosages, phenotypes, &group.samples);
        let score = score_contribution(&variant.dosages, phenotypes, &group.samples);

        let mut cases = Vec::with_capacity(summary.n_case as usize);
        let mut controls = Vec::with_capacity(summary.n_control as usize);
        let mut pooled = Vec::with_capacity(summary.n as usize);
        let mut labels = Vec::with_capacity(summary.n as usize);
        for &i in &group.samples {
            if let Some(x) = variant.dosages[i] {
                if phenotypes[i] {
                    cases.push(x - summary.case_mean);
                } else {
                    controls.push(x - summary.control_mean);
                }
                pooled.push(x);
                labels.push(phenotypes[i]);
            }
        }

        Self {
            summary,
            high_read_depth: group.high_read_depth,
            score,
            cases,
            controls,
            pooled,
            labels,
            draws: Vec::new(),
        }
    }

    /// n * pi * (1 - pi), the sum of squared phenotype residuals.
    fn residual_scale(&self) -> f64 {
        let pi = self.summary.case_fraction();
        self.summary.n * pi * (1.0 - pi)
    }

    /// Bootstrap within each arm from the centered dosages.
    fn resample_arms<R: Rng + ?Sized>(&mut self, rng: &mut R) -> GroupScore {
        if self.cases.is_empty() || self.controls.is_empty() {
            return GroupScore::default();
        }
        let (m1, v1) = bootstrap_moments(&self.cases, &mut self.draws, rng);
        let (m0, v0) = bootstrap_moments(&self.controls, &mut self.draws, rng);

        let scale = self.residual_scale();
        GroupScore {
            score: scale * (m1 - m0),
            variance: scale * scale * (v1 / self.summary.n_case + v0 / self.summary.n_control),
        }
    }

    /// Shuffle the pooled dosages over the fixed case/control layout.
    fn permute<R: Rng + ?Sized>(&mut self, p: &[f64; 3], rng: &mut R) -> GroupScore {
        self.pooled.shuffle(rng);

        let mut case_sum = 0.0;
        let mut control_sum = 0.0;
        for (x, &is_case) in self.pooled.iter().zip(&self.labels) {
            if is_case {
                case_sum += x;
            } else {
                control_sum += x;
            }
        }

        GroupScore {
            score: split_score(case_sum, control_sum, self.summary.case_fraction()),
            variance: score_variance(VarianceModel::Naive, &self.summary, p, self.high_read_depth),
        }
    }
}

/// Mean and (n - 1) variance of one bootstrap sample drawn from `pool`.
fn bootstrap_moments<R: Rng + ?Sized>(pool: &[f64], draws: &mut Vec<f64>, rng: &mut R) -> (f64, f64) {
    let n = pool.len();
    draws.clear();
    draws.extend((0..n).map(|_| pool[rng.gen_range(0..n)]));

    let mean = draws.iter().sum::<f64>() / n as f64;
    let var = if n > 1 {
        draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };
    (mean, var)
}

/// Per-variant, per-group score and variance accumulation.
///
/// Holds, for each group, the observed score and the data needed to redraw
/// bootstrap or permutation replicates of that group's score and variance.
/// One context is built per variant right before testing and dropped after.
#[derive(Debug, Clone)]
pub struct TestContext {
    variant: String,
    genotype_freqs: [f64; 3],
    groups: Vec<GroupData>,
    replicate: Vec<GroupScore>,
}

impl TestContext {
    /// Build the context for `variant`.
    ///
    /// With no groups, all samples form a single low read depth group.
    pub fn new(variant: &Variant, phenotypes: &[bool], groups: &[Group]) -> Result<Self, AssocError> {
        let n_samples = phenotypes.len();
        if variant.dosages.len() != n_samples {
            return Err(AssocError::LengthMismatch {
                variant: variant.label(),
                expected: n_samples,
                found: variant.dosages.len(),
            });
        }

        let implicit;
        let groups = if groups.is_empty() {
            implicit = [Group {
                id: "all".to_string(),
                samples: (0..n_samples).collect(),
                high_read_depth: false,
            }];
            &implicit[..]
        } else {
            groups
        };

        for group in groups {
            if let Some(&index) = group.samples.iter().find(|&&i| i >= n_samples) {
                return Err(AssocError::GroupIndexOutOfRange {
                    group: group.id.clone(),
                    index,
                    n_samples,
                });
            }
        }

        let data: Vec<GroupData> = groups
            .iter()
            .map(|g| GroupData::build(variant, phenotypes, g))
            .collect();
        if data.iter().all(|g| g.summary.n == 0.0) {
            return Err(AssocError::NoObservedDosages {
                variant: variant.label(),
            });
        }

        Ok(Self {
            variant: variant.label(),
            genotype_freqs: variant.genotype_freqs,
            replicate: vec![GroupScore::default(); data.len()],
            groups: data,
        })
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Number of groups.
    pub fn size(&self) -> usize {
        self.groups.len()
    }

    pub fn score(&self, group: usize) -> f64 {
        self.groups[group].score
    }

    pub fn variance(&self, group: usize, model: VarianceModel) -> f64 {
        let g = &self.groups[group];
        score_variance(model, &g.summary, &self.genotype_freqs, g.high_read_depth)
    }

    /// (sum score)^2 / (sum variance) over all groups.
    ///
    /// Not guarded: a zero variance gives NaN or infinity, which the
    /// chi-squared tail maps to the p-value floor.
    pub fn observed_statistic(&self, model: VarianceModel) -> f64 {
        let (score, variance) = (0..self.size()).fold((0.0, 0.0), |(s, v), i| {
            (s + self.score(i), v + self.variance(i, model))
        });
        score * score / variance
    }

    /// Draw a fresh resampled score and variance for every group.
    ///
    /// `Rvs` bootstraps the centered dosages within cases and within
    /// controls; `Naive` permutes dosages across the case/control layout.
    /// The replicate buffer is overwritten on each call.
    pub fn regenerate<R: Rng + ?Sized>(&mut self, model: VarianceModel, rng: &mut R) -> &[GroupScore] {
        let p = self.genotype_freqs;
        for (slot, group) in self.replicate.iter_mut().zip(self.groups.iter_mut()) {
            *slot = match model {
                VarianceModel::Rvs => group.resample_arms(rng),
                VarianceModel::Naive => group.permute(&p, rng),
            };
        }
        &self.replicate
    }
}
