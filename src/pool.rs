//! The dynamic thread pool that multiplexes instances over OS threads.
//!
//! Grounded on the teacher crate's own `Pool`/`PoolBuilder` (spawn-worker,
//! shared state), generalized from "one worker runs one OS child process"
//! to "one worker repeatedly pops the ready queue and drives whichever
//! instance it finds there". Unlike the teacher's own `Pool::kill` (a
//! one-shot, permanent shutdown of every worker), `kill` here is a single
//! incremental operation: each call pushes exactly one exit sentinel, and
//! the next worker that pops it exits. `size` is never decremented by
//! `kill` — it records intended growth only. A full, joining shutdown of
//! every worker still alive happens only when the pool itself is dropped.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

use crate::context::StepOutcome;
use crate::instance::{Instance, InstanceState};
use crate::queue::{ReadyEntry, ReadyQueue, ReadyQueueSender};
use crate::registry::Registry;

static REGISTRY: OnceLock<Registry<Pool>> = OnceLock::new();
static DEFAULT_POOL: OnceLock<Arc<Pool>> = OnceLock::new();

fn registry() -> &'static Registry<Pool> {
    REGISTRY.get_or_init(Registry::new)
}

/// Returns the process-wide default pool, sized to the number of
/// available CPUs on first use.
pub fn default_pool() -> Arc<Pool> {
    DEFAULT_POOL
        .get_or_init(|| Pool::builder().size(num_cpus::get().max(1)).build())
        .clone()
}

/// Builds a [`Pool`] with a chosen initial worker count.
pub struct PoolBuilder {
    size: usize,
}

impl PoolBuilder {
    /// Sets the number of worker threads to start with. Zero is allowed;
    /// such a pool accepts instances but never runs them until [`Pool::add`]
    /// brings a worker online.
    pub fn size(mut self, size: usize) -> PoolBuilder {
        self.size = size;
        self
    }

    /// Starts the pool's worker threads and returns the pool.
    pub fn build(self) -> Arc<Pool> {
        Pool::with_size(self.size)
    }
}

/// A dynamic pool of worker threads driving a shared ready queue of
/// instances.
pub struct Pool {
    ready: ReadyQueue,
    workers: parking_lot::Mutex<Vec<thread::JoinHandle<()>>>,
    size: AtomicUsize,
    live: AtomicUsize,
}

impl Pool {
    /// Returns a builder, defaulting to one worker per available CPU.
    pub fn builder() -> PoolBuilder {
        PoolBuilder {
            size: num_cpus::get().max(1),
        }
    }

    fn with_size(size: usize) -> Arc<Pool> {
        crate::failure::ensure_panic_hook_installed();
        let pool = Arc::new(Pool {
            ready: ReadyQueue::new(),
            workers: parking_lot::Mutex::new(Vec::new()),
            size: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
        });
        for _ in 0..size {
            pool.spawn_worker();
        }
        pool
    }

    fn spawn_worker(self: &Arc<Self>) {
        let pool = self.clone();
        let handle = thread::Builder::new()
            .name("procrt-worker".into())
            .spawn(move || worker_loop(pool))
            .expect("failed to spawn pool worker thread");
        self.workers.lock().push(handle);
        let size = self.size.fetch_add(1, Ordering::SeqCst) + 1;
        self.live.fetch_add(1, Ordering::SeqCst);
        log::debug!("worker spawned, pool size now {}", size);
    }

    /// Starts `n` additional worker threads and returns the pool's new
    /// size. Size grows monotonically; there is no precondition tied to
    /// prior `kill` calls.
    pub fn add(self: &Arc<Self>, n: usize) -> usize {
        for _ in 0..n {
            self.spawn_worker();
        }
        self.size()
    }

    /// Current target worker count. Not decremented by [`Pool::kill`];
    /// it records intended growth, not the live thread count.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Number of worker threads currently running. Unlike [`Pool::size`],
    /// this drops by one each time a worker pops an exit sentinel and
    /// returns.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn ready_queue_sender(&self) -> ReadyQueueSender {
        self.ready.sender()
    }

    /// Pushes one exit sentinel onto the ready queue. The next worker
    /// that pops it exits; calling `kill` again stops another one. Calling
    /// it more times than there are live workers leaves the surplus
    /// sentinels unconsumed in the queue — harmless, since nothing is left
    /// to pop them. Instances still parked on a channel, or already
    /// enqueued but not yet popped, are left as they are — killing a
    /// worker does not drain or cancel them.
    pub fn kill(&self) {
        self.ready.push_exit_sentinel();
        log::debug!("kill: pushed one exit sentinel");
    }

    /// Returns `true` once no worker threads are running. A pool built
    /// with zero workers is trivially dead from the start.
    pub fn is_dead(&self) -> bool {
        self.live() == 0
    }

    /// Returns a stable identity for this pool, registering it so that
    /// [`Pool::get`] can find it again while it is alive.
    pub fn ptr(self: &Arc<Self>) -> usize {
        registry().insert(self)
    }

    /// Looks a pool up by the address returned from an earlier
    /// [`Pool::ptr`] call.
    pub fn get(address: usize) -> Option<Arc<Pool>> {
        registry().get(address)
    }
}

impl PartialEq for Pool {
    fn eq(&self, other: &Pool) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Pool {}

impl std::fmt::Display for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "pool<{:p}>(size={}, dead={})", self, self.size(), self.is_dead())
    }
}

/// Unlike [`Pool::kill`], dropping the pool tears down every worker still
/// alive and joins it, so the pool does not outlive its last handle. This
/// is a distinct operation from `kill`, not a repeated call to it: `kill`
/// is the spec's incremental, per-call sentinel; this is a one-time,
/// full shutdown for when the pool itself is going away.
impl Drop for Pool {
    fn drop(&mut self) {
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for _ in 0..handles.len() {
            self.ready.push_exit_sentinel();
        }
        for handle in handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(pool: Arc<Pool>) {
    loop {
        match pool.ready.pop() {
            Err(_) | Ok(ReadyEntry::Exit) => break,
            Ok(ReadyEntry::Work(instance)) => run_instance(instance),
        }
    }
    pool.live.fetch_sub(1, Ordering::SeqCst);
    log::debug!("worker exiting");
}

fn run_instance(instance: Arc<Instance>) {
    instance.set_state(InstanceState::Running);
    match instance.try_step() {
        None => {
            // no message was available; try_step already parked the
            // instance and registered it as a channel waiter.
        }
        Some(StepOutcome::Continue) => {
            instance.set_state(InstanceState::Ready);
            instance.dispatch();
        }
        Some(StepOutcome::Done) => {
            instance.mark_dead();
        }
        Some(StepOutcome::Err(failure)) => {
            if !instance.process().run_error_handler(&failure) {
                log::warn!("instance terminated with no error handler installed: {}", failure);
            }
            instance.mark_dead();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{message, StepDirective};
    use crate::process::Process;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::sync::Arc as StdArc;
    use std::time::Duration;

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !condition() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(condition(), "condition did not become true in time");
    }

    #[test]
    fn pool_with_zero_workers_starts_empty_but_usable() {
        let pool = Pool::builder().size(0).build();
        assert_eq!(pool.size(), 0);
        assert!(pool.is_dead());
        assert_eq!(pool.add(1), 1);
        assert_eq!(pool.live(), 1);
    }

    #[test]
    fn pool_starts_with_requested_worker_count() {
        let pool = Pool::builder().size(3).build();
        assert_eq!(pool.size(), 3);
        assert_eq!(pool.live(), 3);
    }

    #[test]
    fn kill_stops_exactly_one_worker_per_call() {
        // new(2); kill() once (j=1) must leave k+m-min(j,k+m) = 1 worker.
        let pool = Pool::builder().size(2).build();
        pool.kill();
        wait_until(|| pool.live() == 1);
        assert_eq!(pool.size(), 2, "size is intended growth, not live count");
        assert!(!pool.is_dead());
        pool.kill();
        wait_until(|| pool.is_dead());
    }

    #[test]
    fn repeated_kill_calls_each_stop_one_worker() {
        let pool = Pool::builder().size(1).build();
        pool.kill();
        wait_until(|| pool.is_dead());
        // a second kill with no live worker left just leaves a sentinel
        // unconsumed in the queue; it must not panic or misbehave.
        pool.kill();
        assert!(pool.is_dead());
    }

    #[test]
    fn ptr_round_trips_through_registry() {
        let pool = Pool::builder().size(1).build();
        let address = pool.ptr();
        let looked_up = Pool::get(address).unwrap();
        assert!(Arc::ptr_eq(&pool, &looked_up));
        pool.kill();
    }

    #[test]
    fn instance_runs_to_completion_on_a_worker() {
        let pool = Pool::builder().size(1).build();
        let seen = StdArc::new(StdAtomicUsize::new(0));
        let seen2 = seen.clone();
        let process = Process::new();
        let entry: crate::context::EntryFn = Arc::new(move |msg| {
            let n = *msg.downcast::<u32>().unwrap();
            seen2.store(n as usize, Ordering::SeqCst);
            Ok(StepDirective::Stop)
        });
        process.wrap(entry, None).unwrap();
        process.setpool(Some(pool.clone()));
        process.spawn(1).unwrap();
        process.input().push(message(7u32)).unwrap();

        for _ in 0..200 {
            if seen.load(Ordering::SeqCst) == 7 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        pool.kill();
    }

    #[test]
    fn add_starts_more_workers() {
        let pool = Pool::builder().size(1).build();
        let size = pool.add(2);
        assert_eq!(size, 3);
        for _ in 0..size {
            pool.kill();
        }
        wait_until(|| pool.is_dead());
    }
}
