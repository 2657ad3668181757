use crate::error::AssocError;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// How the variance of the score is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarianceModel {
    /// Variance of the observed dosages, taken as exact genotypes.
    Naive,
    /// RVS: case variance from the genotype frequencies, accounting for
    /// genotype-calling uncertainty.
    Rvs,
}

impl std::str::FromStr for VarianceModel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "naive" => Ok(VarianceModel::Naive),
            "rvs" | "robust" => Ok(VarianceModel::Rvs),
            other => Err(format!("Unknown variance model '{}'. Use 'rvs' or 'naive'.", other)),
        }
    }
}

/// Settings for one association run. Immutable once dispatched.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Resampling iterations per variant; 0 runs the asymptotic test only
    pub nboot: usize,
    pub variance_model: VarianceModel,
    /// Stop resampling once a variant is clearly not significant
    pub stop_early: bool,
    pub nthreads: usize,
    pub seed: u64,
    /// Abort the whole run on the first variant that cannot be tested
    pub fail_fast: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            nboot: 0,
            variance_model: VarianceModel::Rvs,
            stop_early: false,
            nthreads: 1,
            seed: 0,
            fail_fast: false,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), AssocError> {
        if self.nthreads == 0 {
            return Err(AssocError::InvalidConfig(
                "number of threads should be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn uses_bootstrap(&self) -> bool {
        self.nboot > 0
    }

    /// Random stream for the variant at `index`.
    ///
    /// Every variant gets its own ChaCha stream under the run seed, so the
    /// draws do not depend on which worker tests the variant.
    pub fn rng_for(&self, index: usize) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(index as u64);
        rng
    }
}
