use std::collections::HashMap;

/// A single variant with per-sample expected genotype dosages
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub chrom: String,
    pub pos: u64,

    /// E(G | data) per sample, `None` where the sample has no data
    pub dosages: Vec<Option<f64>>,

    /// Genotype frequencies [P(AA), P(Aa), P(aa)] from the likelihood EM
    pub genotype_freqs: [f64; 3],
}

impl Variant {
    pub fn new(chrom: impl Into<String>, pos: u64, dosages: Vec<Option<f64>>, genotype_freqs: [f64; 3]) -> Self {
        Self {
            chrom: chrom.into(),
            pos,
            dosages,
            genotype_freqs,
        }
    }

    /// `chrom:pos`, used in error messages and logs.
    pub fn label(&self) -> String {
        format!("{}:{}", self.chrom, self.pos)
    }

    /// Summary over every sample of the variant.
    pub fn summary(&self, phenotypes: &[bool]) -> DosageSummary {
        let all: Vec<usize> = (0..self.dosages.len().min(phenotypes.len())).collect();
        DosageSummary::from_samples(&self.dosages, phenotypes, &all)
    }
}

/// Case/control dosage summaries over the non-missing part of a sample set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DosageSummary {
    pub n_case: f64,
    pub n_control: f64,
    pub n: f64,
    pub case_mean: f64,
    pub case_var: f64,    // sample variance, n - 1
    pub control_mean: f64,
    pub control_var: f64, // sample variance, n - 1
    pub var: f64,         // pooled population variance, n
}

impl DosageSummary {
    pub fn from_samples(dosages: &[Option<f64>], phenotypes: &[bool], samples: &[usize]) -> Self {
        let mut s = DosageSummary::default();
        let mut case_sum = 0.0;
        let mut control_sum = 0.0;

        for &i in samples {
            if let Some(x) = dosages[i] {
                if phenotypes[i] {
                    s.n_case += 1.0;
                    case_sum += x;
                } else {
                    s.n_control += 1.0;
                    control_sum += x;
                }
            }
        }
        s.n = s.n_case + s.n_control;
        if s.n == 0.0 {
            return s;
        }

        s.case_mean = if s.n_case > 0.0 { case_sum / s.n_case } else { 0.0 };
        s.control_mean = if s.n_control > 0.0 { control_sum / s.n_control } else { 0.0 };
        let mean = (case_sum + control_sum) / s.n;

        let mut case_ss = 0.0;
        let mut control_ss = 0.0;
        let mut pooled_ss = 0.0;
        for &i in samples {
            if let Some(x) = dosages[i] {
                if phenotypes[i] {
                    case_ss += (x - s.case_mean).powi(2);
                } else {
                    control_ss += (x - s.control_mean).powi(2);
                }
                pooled_ss += (x - mean).powi(2);
            }
        }

        s.case_var = if s.n_case > 1.0 { case_ss / (s.n_case - 1.0) } else { 0.0 };
        s.control_var = if s.n_control > 1.0 { control_ss / (s.n_control - 1.0) } else { 0.0 };
        s.var = pooled_ss / s.n;
        s
    }

    /// Fraction of non-missing samples that are cases.
    pub fn case_fraction(&self) -> f64 {
        if self.n > 0.0 {
            self.n_case / self.n
        } else {
            0.0
        }
    }
}

/// A stratum of samples tested together, e.g. one sequencing cohort
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub id: String,
    pub samples: Vec<usize>,
    pub high_read_depth: bool,
}

impl Group {
    /// Build groups from a sample -> group index vector.
    ///
    /// Group `k` collects every sample assigned `k`; its read-depth flag comes
    /// from `high_depth` and defaults to low depth.
    pub fn from_assignment(assignment: &[usize], high_depth: &HashMap<usize, bool>) -> Vec<Group> {
        let n_groups = assignment.iter().max().map_or(0, |m| m + 1);
        let mut groups: Vec<Group> = (0..n_groups)
            .map(|k| Group {
                id: k.to_string(),
                samples: Vec::new(),
                high_read_depth: high_depth.get(&k).copied().unwrap_or(false),
            })
            .collect();
        for (sample, &k) in assignment.iter().enumerate() {
            groups[k].samples.push(sample);
        }
        groups.retain(|g| !g.samples.is_empty());
        groups
    }
}

/// One row of the sample sheet
#[derive(Debug, Clone, PartialEq)]
pub struct SampleInfo {
    pub id: String,
    pub is_case: bool,
    pub group: Option<String>,
    pub high_depth: bool,
}

/// Test outcome paired with the variant it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct VariantResult {
    pub chrom: String,
    pub pos: u64,
    pub p_value: Option<f64>,
    pub note: String, // empty on success, error message otherwise
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_summary_skips_missing() {
        let dosages = vec![Some(0.0), Some(2.0), None, Some(1.0), Some(1.0), None];
        let phenotypes = vec![true, true, true, false, false, false];
        let s = DosageSummary::from_samples(&dosages, &phenotypes, &[0, 1, 2, 3, 4, 5]);

        assert_eq!(s.n_case, 2.0);
        assert_eq!(s.n_control, 2.0);
        assert_eq!(s.n, 4.0);
        assert_relative_eq!(s.case_mean, 1.0);
        assert_relative_eq!(s.case_var, 2.0);
        assert_relative_eq!(s.control_mean, 1.0);
        assert_relative_eq!(s.control_var, 0.0);
        assert_relative_eq!(s.var, 0.5);
        assert_relative_eq!(s.case_fraction(), 0.5);
    }

    #[test]
    fn test_summary_all_missing_is_empty() {
        let s = DosageSummary::from_samples(&[None, None], &[true, false], &[0, 1]);
        assert_eq!(s.n, 0.0);
        assert_eq!(s.case_fraction(), 0.0);
    }

    #[test]
    fn test_clone_is_independent() {
        let original = Variant::new("chr1", 100, vec![Some(0.5), Some(1.5), None], [0.5, 0.4, 0.1]);
        let mut copy = original.clone();
        copy.dosages[0] = Some(2.0);
        copy.dosages.push(Some(1.0));
        copy.genotype_freqs[2] = 0.9;

        assert_eq!(original.dosages, vec![Some(0.5), Some(1.5), None]);
        assert_eq!(original.genotype_freqs, [0.5, 0.4, 0.1]);
    }

    #[test]
    fn test_groups_from_assignment() {
        let mut depth = HashMap::new();
        depth.insert(1, true);
        let groups = Group::from_assignment(&[0, 1, 0, 1, 1], &depth);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].samples, vec![0, 2]);
        assert!(!groups[0].high_read_depth);
        assert_eq!(groups[1].samples, vec![1, 3, 4]);
        assert!(groups[1].high_read_depth);
    }
}
