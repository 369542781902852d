//! Parallel pass recording.
//!
//! `core/src/job/{job,jobthread,scheduler}.rs` predates the 2018 edition and
//! does not compile under a modern one (`Box<JobThreadContext + Send>`
//! without `dyn`); it is not used as grounding (see DESIGN.md). Instead this
//! is grounded on `engine/src/graphics/command.rs`'s
//! `CommandBuffer::split_render_pass`, which fans one job out per chunk of
//! work onto a task pool.

/// Runs one job per pass, optionally across worker threads. A default
/// single-threaded implementation is always available; a `rayon`-backed one
/// is available behind the `parallel` feature.
pub trait JobManager: Send + Sync {
    fn thread_count(&self) -> usize;

    /// Runs `job` for every index in `0..count`, blocking until all have
    /// completed.
    fn dispatch_pass_jobs(&self, count: usize, job: &(dyn Fn(usize) + Send + Sync));
}

/// Runs every pass job inline on the calling thread. Deterministic ordering;
/// used by default and by the test suite.
pub struct SingleThreadedJobManager;

impl JobManager for SingleThreadedJobManager {
    fn thread_count(&self) -> usize {
        1
    }

    fn dispatch_pass_jobs(&self, count: usize, job: &(dyn Fn(usize) + Send + Sync)) {
        for i in 0..count {
            job(i);
        }
    }
}

#[cfg(feature = "parallel")]
pub struct RayonJobManager {
    pool: rayon::ThreadPool,
}

#[cfg(feature = "parallel")]
impl RayonJobManager {
    pub fn new(thread_count: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(thread_count)
            .build()
            .expect("failed to build rayon thread pool");
        RayonJobManager { pool }
    }
}

#[cfg(feature = "parallel")]
impl JobManager for RayonJobManager {
    fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn dispatch_pass_jobs(&self, count: usize, job: &(dyn Fn(usize) + Send + Sync)) {
        self.pool.scope(|scope| {
            for i in 0..count {
                scope.spawn(move |_| job(i));
            }
        });
    }
}
