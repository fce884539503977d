use crate::grader::{
    CorrectionId, RunOptions, assignment::Assignment, runner::CancelToken, verdict::Verdict,
    verifier::VerifierRegistry,
};
use log::debug;
use std::{
    num::NonZeroUsize,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

/// One worker per available CPU.
pub fn default_jobs() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Runs the given corrections on at most `jobs` scoped worker threads.
///
/// Workers pull the next id from a shared counter, so corrections start in the order of
/// `ids` but may finish in any order. `on_verdict` is called from the worker as soon as a
/// correction finishes. Once `cancel` is raised no new correction is started.
pub(crate) fn run_batch<F>(
    assignment: &Assignment,
    registry: &VerifierRegistry,
    options: &RunOptions,
    ids: &[CorrectionId],
    jobs: usize,
    cancel: &CancelToken,
    on_verdict: F,
) where
    F: Fn(CorrectionId, &Verdict) + Sync,
{
    let jobs = jobs.clamp(1, ids.len().max(1));
    debug!("Running {} corrections on {jobs} workers", ids.len());
    let next = AtomicUsize::new(0);

    thread::scope(|scope| {
        for _ in 0..jobs {
            scope.spawn(|| {
                loop {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let idx = next.fetch_add(1, Ordering::Relaxed);
                    let Some(&id) = ids.get(idx) else {
                        return;
                    };
                    let Some(correction) = assignment.correction(id) else {
                        continue;
                    };
                    let verdict = correction.run(registry, options, cancel);
                    on_verdict(id, &verdict);
                }
            });
        }
    });
}
