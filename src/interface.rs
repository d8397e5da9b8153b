//! Periodic execution of installed queries.
//!
//! Every installed query gets its own task on the tokio runtime. The task
//! ticks at a fixed interval and runs the (synchronous) evaluation on the
//! blocking pool. Cancellation is cooperative via an `Arc<AtomicBool>`, and
//! dropping a [`QueryHandle`] cancels its task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::error::{AtlasError, Result};

/// Cancellation token shared with the scheduled task.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);
impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Opaque identifier of a scheduled query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(u64);
impl QueryId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// What a scheduled job wants after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stop,
}

/// Handle to a scheduled query; dropping it stops the schedule.
#[derive(Debug)]
pub struct QueryHandle {
    id: QueryId,
    cancel: CancelToken,
    started: Instant,
    task: JoinHandle<()>,
}
impl QueryHandle {
    pub fn id(&self) -> QueryId {
        self.id
    }
    /// Stops further runs. A run already on the blocking pool completes.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.task.abort();
    }
    /// Elapsed time since the query was scheduled.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
impl Drop for QueryHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Hands out query ids and spawns the periodic tasks.
#[derive(Debug)]
pub struct Scheduler {
    period: Duration,
    next_id: AtomicU64,
}

impl Scheduler {
    pub fn new(period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(AtlasError::Config("query interval must be positive".into()));
        }
        Ok(Self { period, next_id: AtomicU64::new(0) })
    }
    pub fn period(&self) -> Duration {
        self.period
    }

    fn allocate_id(&self) -> QueryId {
        QueryId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Runs `job` right away and then once per period until the handle is
    /// cancelled or dropped, or the job returns [`Tick::Stop`]. Failed runs
    /// are logged and the schedule carries on. Must be called from within a
    /// tokio runtime.
    pub fn schedule<F>(&self, label: impl Into<String>, job: F) -> Result<QueryHandle>
    where
        F: Fn() -> Result<Tick> + Send + Sync + 'static,
    {
        let runtime = Handle::try_current()
            .map_err(|e| AtlasError::Execution(format!("no async runtime to schedule queries on: {e}")))?;
        let id = self.allocate_id();
        let label = label.into();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let period = self.period;
        let job = Arc::new(job);
        let task_label = label.clone();
        let task = runtime.spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if token.is_cancelled() {
                    break;
                }
                let job = Arc::clone(&job);
                match tokio::task::spawn_blocking(move || job()).await {
                    Ok(Ok(Tick::Continue)) => {}
                    Ok(Ok(Tick::Stop)) => break,
                    Ok(Err(e)) => warn!(query = %task_label, error = %e, "scheduled query failed"),
                    Err(e) => warn!(query = %task_label, error = %e, "scheduled query did not complete"),
                }
            }
            debug!(query = %task_label, "schedule stopped");
        });
        debug!(query = %label, id = id.value(), every_ms = period.as_millis() as u64, "query scheduled");
        Ok(QueryHandle { id, cancel, started: Instant::now(), task })
    }
}
