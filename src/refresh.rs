//! Periodic read-compute cycle over an [`EntityStore`].
//!
//! One task per running refresh. Each tick fetches a snapshot, computes a
//! [`StatsReport`] and publishes it into a slot shared with the handle.
//! Ticks never overlap: the interval is only polled again once the previous
//! cycle has finished, and late ticks are delayed rather than bunched.
//!
//! Publishing is done under the slot lock after checking the stopped flag,
//! and [`RefreshHandle::stop`] raises that flag under the same lock. Once
//! `stop` returns no callback fires and the slot no longer changes, even if
//! a fetch was in flight at the time.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::calc::{self, CalcError, ReportOptions, StatsReport};
use crate::store::{self, EntityStore};

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub interval: Duration,
    pub options: ReportOptions,
}

#[derive(Debug, Clone)]
pub struct Published {
    pub tick: u64,
    pub report: Arc<StatsReport>,
}

#[derive(Debug, Clone)]
pub struct CycleFailure {
    pub tick: u64,
    pub error: CalcError,
}

type ResultCallback = Box<dyn Fn(&Published) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&CycleFailure) + Send + Sync>;

#[derive(Default)]
struct Slot {
    stopped: bool,
    latest: Option<Published>,
}

struct Shared {
    slot: Mutex<Slot>,
    cancel: CancellationToken,
    on_result: ResultCallback,
    on_error: ErrorCallback,
}

impl Shared {
    fn publish(&self, tick: u64, outcome: Result<StatsReport, CalcError>) {
        let mut slot = self.slot.lock();
        if slot.stopped {
            tracing::debug!(tick, "refresh stopped; discarding cycle result");
            return;
        }
        if slot.latest.as_ref().map(|p| p.tick >= tick).unwrap_or(false) {
            tracing::debug!(tick, "newer result already published; discarding");
            return;
        }
        match outcome {
            Ok(report) => {
                let published = Published {
                    tick,
                    report: Arc::new(report),
                };
                slot.latest = Some(published.clone());
                (self.on_result)(&published);
            }
            Err(error) => {
                tracing::warn!(tick, code = error.code(), %error, "refresh cycle failed");
                (self.on_error)(&CycleFailure { tick, error });
            }
        }
    }
}

/// Handle to a running refresh. Dropping it stops the refresh.
pub struct RefreshHandle {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Idempotent. After this returns nothing is published for this refresh.
    /// Callbacks run under the slot lock: they must not block on I/O and
    /// must not call `stop` themselves.
    pub fn stop(&self) {
        {
            let mut slot = self.shared.slot.lock();
            if !slot.stopped {
                slot.stopped = true;
                tracing::info!("refresh stopped");
            }
        }
        self.shared.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.slot.lock().stopped
    }

    /// Last successfully published result; failed cycles never clear it.
    pub fn latest(&self) -> Option<Published> {
        self.shared.slot.lock().latest.clone()
    }

    /// Waits for the refresh task to wind down after [`stop`](Self::stop).
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts a refresh on the current tokio runtime. The first cycle runs
/// immediately.
pub fn start_refresh<R, E>(
    store: Arc<dyn EntityStore>,
    config: RefreshConfig,
    on_result: R,
    on_error: E,
) -> Result<RefreshHandle, CalcError>
where
    R: Fn(&Published) + Send + Sync + 'static,
    E: Fn(&CycleFailure) + Send + Sync + 'static,
{
    if config.interval.is_zero() {
        return Err(CalcError::validation("refresh interval must be positive"));
    }
    calc::check_threshold(config.options.pass_threshold)?;

    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::default()),
        cancel: CancellationToken::new(),
        on_result: Box::new(on_result),
        on_error: Box::new(on_error),
    });

    tracing::info!(interval_ms = config.interval.as_millis() as u64, "refresh started");
    let task = tokio::spawn(run(store, config, shared.clone()));
    Ok(RefreshHandle {
        shared,
        task: Some(task),
    })
}

async fn run(store: Arc<dyn EntityStore>, config: RefreshConfig, shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tick += 1;
        tracing::debug!(tick, "refresh cycle");

        // An in-flight fetch is allowed to finish; publish() drops its result
        // if the refresh was stopped meanwhile.
        let outcome = match store::fetch_snapshot(store.as_ref()).await {
            Ok(snapshot) => calc::compute_stats_report(&snapshot, &config.options),
            Err(e) => Err(e),
        };
        shared.publish(tick, outcome);
    }
    tracing::debug!(ticks = tick, "refresh task finished");
}
