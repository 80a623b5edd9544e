//! Pluggable thread-pool contract and the default worker pool
//!
//! The pipeline only needs one capability: run N self-contained jobs and
//! wait for all of them.  [`ThreadPool`] captures that contract so hosts can
//! substitute their own scheduler; [`StdPool`] is the default, built on
//! scoped threads pulling from a shared LIFO job stack behind a single
//! mutex.  The calling thread drains the stack alongside the workers rather
//! than blocking (work-helping).
//!
//! Jobs always run to completion — a failing job parks its error in its
//! result slot, sibling jobs are not cancelled, and the orchestrator applies
//! first-error-wins after the join.

use crate::Error;
use std::ops::Range;
use std::sync::Mutex;

/// Upper bound on sub-jobs per phase, independent of hardware threads
pub const MAX_SUB_JOBS: usize = 64;

/// A self-contained unit of work
pub type Job<'s> = Box<dyn FnOnce() -> Result<(), Error> + Send + 's>;

/// The "run N tasks, wait for completion" capability the pipeline consumes
pub trait ThreadPool: Sync {
    /// Number of worker threads the pool will bring to bear
    fn thread_count(&self) -> usize;

    /// Runs every job to completion and returns their results positionally
    fn run<'s>(&self, jobs: Vec<Job<'s>>) -> Vec<Result<(), Error>>;
}

/// Default pool: scoped threads over a mutex-guarded LIFO job stack
#[derive(Debug)]
pub struct StdPool {
    threads: usize,
}

impl StdPool {
    /// Builds a pool sized to the available hardware parallelism
    pub fn new() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self { threads }
    }

    /// Builds a pool with an explicit thread count
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }
}

impl Default for StdPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadPool for StdPool {
    fn thread_count(&self) -> usize {
        self.threads
    }

    fn run<'s>(&self, jobs: Vec<Job<'s>>) -> Vec<Result<(), Error>> {
        let count = jobs.len();
        let stack: Mutex<Vec<(usize, Job)>> =
            Mutex::new(jobs.into_iter().enumerate().collect());
        let results: Vec<Mutex<Option<Result<(), Error>>>> =
            (0..count).map(|_| Mutex::new(None)).collect();
        let worker = |stack: &Mutex<Vec<(usize, Job)>>,
                      results: &[Mutex<Option<Result<(), Error>>>]| {
            loop {
                let next = stack.lock().unwrap().pop();
                let Some((idx, job)) = next else { break };
                let out = job();
                *results[idx].lock().unwrap() = Some(out);
            }
        };
        // the caller is one of the workers; spawn helpers only if there is
        // work enough to share
        let helpers = self.threads.saturating_sub(1).min(count.saturating_sub(1));
        std::thread::scope(|s| {
            for _ in 0..helpers {
                s.spawn(|| worker(&stack, &results));
            }
            worker(&stack, &results);
        });
        results
            .into_iter()
            .map(|slot| {
                slot.into_inner()
                    .unwrap()
                    .expect("job completed without a result")
            })
            .collect()
    }
}

/// Splits `0..len` into at most `max_jobs` near-equal ranges
pub fn partition(len: usize, max_jobs: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return vec![];
    }
    let jobs = max_jobs.clamp(1, MAX_SUB_JOBS).min(len);
    let base = len / jobs;
    let extra = len % jobs;
    let mut out = Vec::with_capacity(jobs);
    let mut start = 0;
    for i in 0..jobs {
        let size = base + usize::from(i < extra);
        out.push(start..start + size);
        start += size;
    }
    debug_assert_eq!(start, len);
    out
}

/// Partitions `0..len` across the pool, runs `f` once per range, and
/// collects the per-job outputs in range order
///
/// First-error-wins: if any job fails, the error of the earliest failing
/// job is returned after every job has completed.
pub fn run_ranged<'s, T, F>(
    pool: &dyn ThreadPool,
    len: usize,
    f: F,
) -> Result<Vec<T>, Error>
where
    T: Send + 's,
    F: Fn(usize, Range<usize>) -> Result<T, Error> + Sync + 's,
{
    let ranges = partition(len, pool.thread_count().min(MAX_SUB_JOBS));
    let slots: Vec<Mutex<Option<T>>> =
        ranges.iter().map(|_| Mutex::new(None)).collect();
    let f = &f;
    let jobs: Vec<Job> = ranges
        .iter()
        .cloned()
        .enumerate()
        .map(|(i, range)| {
            let slot = &slots[i];
            let job: Job = Box::new(move || {
                let out = f(i, range)?;
                *slot.lock().unwrap() = Some(out);
                Ok(())
            });
            job
        })
        .collect();
    let results = pool.run(jobs);
    debug_assert_eq!(results.len(), slots.len());
    for (i, r) in results.into_iter().enumerate() {
        if let Err(e) = r {
            return Err(Error::JobFailed {
                index: i,
                source: Box::new(e),
            });
        }
    }
    Ok(slots
        .into_iter()
        .map(|s| s.into_inner().unwrap().expect("successful job left no output"))
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn partition_covers_everything() {
        for len in [0, 1, 7, 64, 1000] {
            for jobs in [1, 3, 8, MAX_SUB_JOBS] {
                let ranges = partition(len, jobs);
                let total: usize = ranges.iter().map(|r| r.len()).sum();
                assert_eq!(total, len);
                for w in ranges.windows(2) {
                    assert_eq!(w[0].end, w[1].start);
                }
            }
        }
    }

    #[test]
    fn all_jobs_run() {
        let pool = StdPool::with_threads(4);
        let counter = AtomicUsize::new(0);
        let jobs: Vec<Job> = (0..32)
            .map(|_| {
                let counter = &counter;
                let job: Job = Box::new(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                });
                job
            })
            .collect();
        let results = pool.run(jobs);
        assert_eq!(counter.load(Ordering::Relaxed), 32);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn errors_are_positional_and_siblings_still_run() {
        let pool = StdPool::with_threads(2);
        let ran = AtomicUsize::new(0);
        let jobs: Vec<Job> = (0..8)
            .map(|i| {
                let ran = &ran;
                let job: Job = Box::new(move || {
                    ran.fetch_add(1, Ordering::Relaxed);
                    if i == 3 {
                        Err(Error::EmptyMesh)
                    } else {
                        Ok(())
                    }
                });
                job
            })
            .collect();
        let results = pool.run(jobs);
        assert_eq!(ran.load(Ordering::Relaxed), 8);
        assert!(results[3].is_err());
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    }

    #[test]
    fn run_ranged_collects_in_order() {
        let pool = StdPool::with_threads(4);
        let out =
            run_ranged(&pool, 100, |_, range| Ok(range.len())).unwrap();
        assert_eq!(out.iter().sum::<usize>(), 100);
    }

    #[test]
    fn run_ranged_first_error_wins() {
        let pool = StdPool::with_threads(4);
        let err = run_ranged(&pool, 100, |i, _| {
            if i > 0 {
                Err(Error::EmptyMesh)
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        match err {
            Error::JobFailed { index, .. } => assert!(index > 0),
            _ => panic!("wrong error kind"),
        }
    }
}
