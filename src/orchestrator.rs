use crate::bootstrap::bootstrap_test;
use crate::config::RunConfig;
use crate::context::TestContext;
use crate::error::AssocError;
use crate::significance::asymptotic_test;
use crate::types::{Group, Variant};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Interleave per-worker result lists back into global order.
///
/// Worker `k` produced the results for items `k, k + N, k + 2N, ...`, so
/// round `j` takes the `j`-th result of worker 0, worker 1, ... in turn,
/// skipping workers that have no `j`-th result.
pub fn merge_round_robin<T>(per_worker: Vec<Vec<T>>) -> Vec<T> {
    let total = per_worker.iter().map(Vec::len).sum();
    let mut merged = Vec::with_capacity(total);
    let mut workers: Vec<_> = per_worker.into_iter().map(Vec::into_iter).collect();

    loop {
        let mut any = false;
        for worker in workers.iter_mut() {
            if let Some(item) = worker.next() {
                merged.push(item);
                any = true;
            }
        }
        if !any {
            break;
        }
    }
    merged
}

/// Run `task` for every index in `0..n_items` on `nthreads` workers.
///
/// Worker `k` handles `k, k + nthreads, k + 2 * nthreads, ...` on a dedicated
/// rayon pool; the call blocks until every worker is done and returns the
/// results in index order. With `nthreads <= 1` the tasks run sequentially
/// on the calling thread.
pub fn run_strided<T, F>(n_items: usize, nthreads: usize, task: F) -> Result<Vec<T>, AssocError>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    if nthreads <= 1 {
        return Ok((0..n_items).map(task).collect());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(nthreads)
        .thread_name(|i| format!("rvs-worker-{}", i))
        .build()
        .map_err(|e| AssocError::ThreadPool(e.to_string()))?;

    let per_worker: Vec<Vec<T>> = pool.install(|| {
        (0..nthreads)
            .into_par_iter()
            .map(|worker| (worker..n_items).step_by(nthreads).map(&task).collect())
            .collect()
    });

    Ok(merge_round_robin(per_worker))
}

/// Test one variant: asymptotic when `nboot == 0`, resampling otherwise.
///
/// `index` is the variant's position in the run and selects its random
/// stream, so resampling results do not depend on the thread count.
pub fn test_variant(
    variant: &Variant,
    index: usize,
    phenotypes: &[bool],
    groups: &[Group],
    config: &RunConfig,
) -> Result<f64, AssocError> {
    let mut context = TestContext::new(variant, phenotypes, groups)?;

    if config.uses_bootstrap() {
        let mut rng = config.rng_for(index);
        let outcome = bootstrap_test(
            &mut context,
            config.variance_model,
            config.nboot,
            config.stop_early,
            &mut rng,
        );
        Ok(outcome.p_value)
    } else {
        Ok(asymptotic_test(&context, config.variance_model))
    }
}

/// Test every variant and return one outcome per variant, in input order.
///
/// A variant that cannot be tested keeps its error in its own slot. With
/// `fail_fast`, workers skip their remaining variants after the first
/// failure and the run returns the earliest recorded error instead.
pub fn run_tests(
    variants: &[Variant],
    phenotypes: &[bool],
    groups: &[Group],
    config: &RunConfig,
    progress: Option<&ProgressBar>,
) -> Result<Vec<Result<f64, AssocError>>, AssocError> {
    config.validate()?;
    let failed = AtomicBool::new(false);

    let outcomes = run_strided(variants.len(), config.nthreads, |i| {
        if config.fail_fast && failed.load(Ordering::Relaxed) {
            return None;
        }

        let outcome = test_variant(&variants[i], i, phenotypes, groups, config);
        if let Err(e) = &outcome {
            log::warn!("{}", e);
            failed.store(true, Ordering::Relaxed);
        }
        if let Some(pb) = progress {
            pb.inc(1);
        }
        Some(outcome)
    })?;

    let mut results = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            Some(Err(e)) if config.fail_fast => return Err(e),
            Some(result) => results.push(result),
            // skipped after a failure; that failure is returned above
            None => continue,
        }
    }
    Ok(results)
}
