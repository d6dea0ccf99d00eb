use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use reqsched_core::RequestDefinition;
use reqsched_template::DynamicResolver;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::resolve::resolve_request;
use crate::schedule::{NextFire, ScheduleEngine};
use crate::transport::{HttpTransport, TransportError};

use super::gate::ConcurrencyGate;
use super::types::{
    DispatchConfig, DispatchError, DispatchOutcome, DispatchStats, DryRunEntry, RunMode,
    RunReport, StatsCounters,
};

const ABANDONED: &str = "abandoned: dispatcher stopped";
const ABORTED: &str = "aborted: shutdown grace elapsed";

/// Where a definition stands in continuous mode.
#[derive(Debug, Clone, Copy, Default)]
enum SlotState {
    /// Not computed yet, or the last evaluation failed. Evaluated on every poll.
    #[default]
    Pending,
    Armed(NextFire),
    Exhausted,
}

#[derive(Debug, Clone, Copy, Default)]
struct DueSlot {
    state: SlotState,
    /// Base instant of the last send attempt.
    last_base: Option<DateTime<Utc>>,
    /// Consecutive evaluation failures.
    failures: u32,
    /// Held by a worker between claim and reschedule.
    claimed: bool,
}

/// One dispatch and whether it reached the transport.
struct Attempt {
    outcome: DispatchOutcome,
    sent: bool,
}

struct Inner {
    requests: Arc<[RequestDefinition]>,
    resolver: DynamicResolver,
    schedule: ScheduleEngine,
    transport: Arc<dyn HttpTransport>,
    config: DispatchConfig,
    gate: ConcurrencyGate,
    due: Mutex<Vec<DueSlot>>,
    running: AtomicBool,
    stopped: AtomicBool,
    stop_notify: Notify,
    stats: StatsCounters,
}

/// Runs request definitions in dry-run, once, or continuous mode.
///
/// Cheap to clone; clones share state, so `stop()` on any clone stops the run.
/// Stopping is terminal: a stopped dispatcher sends nothing further.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("requests", &self.inner.requests.len())
            .field("config", &self.inner.config)
            .field("running", &self.is_running())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Clears the running flag when a run ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Dispatcher {
    pub fn new(
        requests: Vec<RequestDefinition>,
        resolver: DynamicResolver,
        schedule: ScheduleEngine,
        transport: Arc<dyn HttpTransport>,
        config: DispatchConfig,
    ) -> Self {
        let config = config.normalized();
        let slots = vec![DueSlot::default(); requests.len()];
        Self {
            inner: Arc::new(Inner {
                requests: requests.into(),
                resolver,
                schedule,
                transport,
                gate: ConcurrencyGate::new(config.concurrency),
                config,
                due: Mutex::new(slots),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                stop_notify: Notify::new(),
                stats: StatsCounters::default(),
            }),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    pub fn requests(&self) -> &[RequestDefinition] {
        &self.inner.requests
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.inner.gate
    }

    pub fn stats(&self) -> DispatchStats {
        self.inner.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Run in `mode`. Only one run may be active at a time.
    pub async fn run(&self, mode: RunMode) -> Result<RunReport, DispatchError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(DispatchError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.inner.running);

        info!(
            requests = self.inner.requests.len(),
            workers = self.inner.config.workers,
            concurrency = self.inner.config.concurrency,
            mode = ?mode,
            "dispatcher starting"
        );

        match mode {
            RunMode::DryRun => Ok(RunReport::DryRun(self.dry_run())),
            RunMode::Once => self.run_once().await.map(RunReport::Once),
            RunMode::Continuous => self.run_continuous().await.map(RunReport::Continuous),
        }
    }

    /// Request shutdown. Idempotent.
    ///
    /// Poll loops exit, queued dispatches are abandoned, and sends already in
    /// flight get `shutdown_grace` before being aborted.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(in_flight = self.inner.gate.in_flight(), "dispatcher stop requested");
        self.inner.gate.close();
        self.inner.stop_notify.notify_waiters();
    }

    /// Resolves once `stop()` has been called (immediately if it already was).
    pub async fn wait_stopped(&self) {
        let notified = self.inner.stop_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_stopped() {
            return;
        }
        notified.await;
    }

    async fn grace_elapsed(&self) {
        self.wait_stopped().await;
        tokio::time::sleep(self.inner.config.shutdown_grace).await;
    }

    fn due_table(&self) -> MutexGuard<'_, Vec<DueSlot>> {
        self.inner.due.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Dry run ─────────────────────────────────────────────────────

    fn dry_run(&self) -> Vec<DryRunEntry> {
        info!("dry run: no requests will be sent");
        self.inner
            .requests
            .iter()
            .map(|def| {
                let now = self.inner.schedule.now();
                let resolved = self
                    .inner
                    .schedule
                    .compute_next(&def.schedule, now)
                    .map_err(|e| format!("schedule: {e}"))
                    .and_then(|at| {
                        resolve_request(&self.inner.resolver, def, at).map_err(|e| e.to_string())
                    });

                match resolved {
                    Ok(resolved) => {
                        info!(
                            request = %resolved.name,
                            method = %resolved.method,
                            url = %resolved.url,
                            scheduled_for = %resolved.scheduled_for.to_rfc3339(),
                            "dry run"
                        );
                        DryRunEntry {
                            name: def.name.clone(),
                            resolved: Some(resolved),
                            error: None,
                        }
                    }
                    Err(error) => {
                        warn!(request = %def.name, error = %error, "dry run: evaluation failed");
                        DryRunEntry {
                            name: def.name.clone(),
                            resolved: None,
                            error: Some(error),
                        }
                    }
                }
            })
            .collect()
    }

    // ── Once ────────────────────────────────────────────────────────

    async fn run_once(&self) -> Result<Vec<DispatchOutcome>, DispatchError> {
        let requests = Arc::clone(&self.inner.requests);
        let mut outcomes: Vec<Option<DispatchOutcome>> = vec![None; requests.len()];
        let mut tasks = JoinSet::new();

        // Permits are taken in definition order, so the gate admits FIFO.
        for (index, def) in requests.iter().enumerate() {
            let permit = match self.inner.gate.acquire().await {
                Some(permit) if !self.is_stopped() => permit,
                _ => {
                    outcomes[index] = Some(self.abandon(def));
                    continue;
                }
            };
            let this = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                (index, this.fire_once(index).await)
            });
        }

        let completed = tokio::select! {
            result = collect_outcomes(&mut tasks, &mut outcomes) => {
                result?;
                true
            }
            _ = self.grace_elapsed() => false,
        };

        if !completed {
            warn!(aborted = tasks.len(), "shutdown grace elapsed, aborting in-flight sends");
            tasks.abort_all();
            while let Some(joined) = tasks.join_next().await {
                if let Ok((index, outcome)) = joined {
                    outcomes[index] = Some(outcome);
                }
            }
        }

        let outcomes: Vec<DispatchOutcome> = outcomes
            .into_iter()
            .zip(requests.iter())
            .map(|(outcome, def)| {
                outcome.unwrap_or_else(|| {
                    StatsCounters::bump(&self.inner.stats.failed);
                    DispatchOutcome::failed(def, self.inner.schedule.now(), ABORTED)
                })
            })
            .collect();

        info!(
            total = outcomes.len(),
            succeeded = outcomes.iter().filter(|o| o.success).count(),
            "all requests completed"
        );
        Ok(outcomes)
    }

    async fn fire_once(&self, index: usize) -> DispatchOutcome {
        let def = &self.inner.requests[index];
        let now = self.inner.schedule.now();
        match self.inner.schedule.compute_next(&def.schedule, now) {
            Ok(at) => self.dispatch(def, at).await.outcome,
            Err(e) => {
                StatsCounters::bump(&self.inner.stats.schedule_errors);
                warn!(request = %def.name, error = %e, "failed to compute schedule");
                DispatchOutcome::failed(def, now, format!("schedule: {e}"))
            }
        }
    }

    fn abandon(&self, def: &RequestDefinition) -> DispatchOutcome {
        StatsCounters::bump(&self.inner.stats.abandoned);
        debug!(request = %def.name, "dispatch abandoned");
        DispatchOutcome::failed(def, self.inner.schedule.now(), ABANDONED)
    }

    // ── Continuous ──────────────────────────────────────────────────

    async fn run_continuous(&self) -> Result<DispatchStats, DispatchError> {
        self.seed_due_table();

        let mut workers = JoinSet::new();
        for id in 0..self.inner.config.workers {
            let this = self.clone();
            workers.spawn(async move { this.worker_loop(id).await });
        }
        while let Some(joined) = workers.join_next().await {
            joined.map_err(|e| DispatchError::TaskFailed(e.to_string()))?;
        }

        let stats = self.stats();
        info!(
            dispatched = stats.dispatched,
            succeeded = stats.succeeded,
            non_success = stats.non_success,
            failed = stats.failed,
            "dispatcher stopped"
        );
        Ok(stats)
    }

    fn seed_due_table(&self) {
        let now = self.inner.schedule.now();
        let mut due = self.due_table();
        *due = vec![DueSlot::default(); self.inner.requests.len()];
        for (index, slot) in due.iter_mut().enumerate() {
            self.arm(index, slot, now);
        }
    }

    /// Compute the next fire for a slot.
    ///
    /// A base no later than the last attempted one means the schedule has
    /// nothing new to offer, so the slot is exhausted. That covers absolute
    /// instants and expressions that keep yielding the same time. Evaluation
    /// failures leave the slot pending for the next poll.
    fn arm(&self, index: usize, slot: &mut DueSlot, reference: DateTime<Utc>) {
        let def = &self.inner.requests[index];
        slot.state = match self.inner.schedule.compute_fire(&def.schedule, reference) {
            Ok(fire) if slot.last_base.is_some_and(|last| fire.base <= last) => {
                debug!(request = %def.name, "schedule exhausted");
                SlotState::Exhausted
            }
            Ok(fire) => {
                debug!(request = %def.name, next = %fire.at.to_rfc3339(), "scheduled");
                slot.failures = 0;
                SlotState::Armed(fire)
            }
            Err(e) => {
                StatsCounters::bump(&self.inner.stats.schedule_errors);
                slot.failures = slot.failures.saturating_add(1);
                if slot.failures == 1 {
                    warn!(request = %def.name, error = %e, "failed to compute schedule, retrying each poll");
                } else {
                    debug!(request = %def.name, error = %e, failures = slot.failures, "schedule still failing");
                }
                SlotState::Pending
            }
        };
    }

    /// Claim every unclaimed slot whose instant has arrived, evaluating
    /// pending slots first.
    fn claim_due(&self, now: DateTime<Utc>) -> Vec<(usize, NextFire)> {
        let mut due = self.due_table();
        let mut claimed = Vec::new();
        for (index, slot) in due.iter_mut().enumerate() {
            if slot.claimed {
                continue;
            }
            if matches!(slot.state, SlotState::Pending) {
                self.arm(index, slot, now);
            }
            if let SlotState::Armed(fire) = slot.state {
                if fire.at <= now {
                    slot.claimed = true;
                    claimed.push((index, fire));
                }
            }
        }
        claimed
    }

    /// Release the claim on a slot after a dispatch.
    ///
    /// An attempt that never reached the transport keeps the same instant, so
    /// the next poll retries it.
    fn reschedule(&self, index: usize, fire: NextFire, sent: bool) {
        let mut due = self.due_table();
        let slot = &mut due[index];
        slot.claimed = false;
        if sent {
            slot.last_base = Some(fire.base);
            self.arm(index, slot, self.inner.schedule.now());
        }
    }

    async fn worker_loop(&self, id: usize) {
        let mut in_flight = JoinSet::new();
        let mut ticker = tokio::time::interval(self.inner.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(worker = id, "worker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wait_stopped() => {}
            }
            if self.is_stopped() {
                break;
            }

            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!(worker = id, error = %e, "dispatch task failed");
                }
            }

            // Permits are taken inside each task so a full gate never stalls polling.
            for (index, fire) in self.claim_due(self.inner.schedule.now()) {
                let this = self.clone();
                in_flight.spawn(async move {
                    let def = &this.inner.requests[index];
                    let Some(_permit) = this.inner.gate.acquire().await else {
                        this.abandon(def);
                        return;
                    };
                    let attempt = this.dispatch(def, fire.at).await;
                    this.reschedule(index, fire, attempt.sent);
                });
            }
        }

        self.drain(id, &mut in_flight).await;
        debug!(worker = id, "worker stopped");
    }

    /// Wait up to `shutdown_grace` for in-flight sends, then abort the rest.
    async fn drain(&self, worker: usize, in_flight: &mut JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }
        let finished = tokio::time::timeout(self.inner.config.shutdown_grace, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if finished.is_err() {
            warn!(worker, aborted = in_flight.len(), "shutdown grace elapsed, aborting in-flight sends");
            in_flight.abort_all();
            while let Some(joined) = in_flight.join_next().await {
                if joined.is_err() {
                    StatsCounters::bump(&self.inner.stats.failed);
                }
            }
        }
    }

    // ── Single dispatch ─────────────────────────────────────────────

    /// Resolve and send one definition. Never panics on request failure;
    /// every failure is reported in the outcome.
    async fn dispatch(&self, def: &RequestDefinition, scheduled_for: DateTime<Utc>) -> Attempt {
        let stats = &self.inner.stats;
        let unsent = |outcome| Attempt { outcome, sent: false };
        if self.is_stopped() {
            return unsent(self.abandon(def));
        }

        let resolved = match resolve_request(&self.inner.resolver, def, scheduled_for) {
            Ok(resolved) => resolved,
            Err(e) => {
                StatsCounters::bump(&stats.resolve_errors);
                warn!(request = %def.name, error = %e, "failed to resolve request");
                return unsent(DispatchOutcome::failed(def, scheduled_for, e.to_string()));
            }
        };

        // A stop may have landed during resolution.
        if self.is_stopped() {
            return unsent(self.abandon(def));
        }

        StatsCounters::bump(&stats.dispatched);
        info!(
            request = %resolved.name,
            method = %resolved.method,
            url = %resolved.url,
            scheduled_for = %scheduled_for.to_rfc3339(),
            "sending request"
        );

        let timeout = self.inner.config.timeout;
        let start = Instant::now();
        let result = tokio::time::timeout(timeout, self.inner.transport.send(&resolved, timeout))
            .await
            .unwrap_or(Err(TransportError::Timeout(timeout)));
        let elapsed = start.elapsed();

        let mut outcome = DispatchOutcome {
            url: resolved.url.clone(),
            ..DispatchOutcome::unsent(def, scheduled_for)
        };

        match result {
            Ok(response) => {
                outcome.status = Some(response.status);
                outcome.status_line = Some(response.status_line.clone());
                outcome.duration = response.duration;
                outcome.success = response.is_success();
                if outcome.success {
                    StatsCounters::bump(&stats.succeeded);
                    info!(
                        request = %resolved.name,
                        status = %response.status_line,
                        duration_ms = response.duration.as_millis() as u64,
                        "request completed"
                    );
                } else {
                    StatsCounters::bump(&stats.non_success);
                    warn!(
                        request = %resolved.name,
                        status = %response.status_line,
                        duration_ms = response.duration.as_millis() as u64,
                        "request completed with non-success status"
                    );
                }
            }
            Err(e) => {
                StatsCounters::bump(&stats.failed);
                outcome.duration = elapsed;
                warn!(
                    request = %resolved.name,
                    error = %e,
                    duration_ms = elapsed.as_millis() as u64,
                    "request failed"
                );
                outcome.error = Some(e.to_string());
            }
        }
        Attempt { outcome, sent: true }
    }
}

async fn collect_outcomes(
    tasks: &mut JoinSet<(usize, DispatchOutcome)>,
    outcomes: &mut [Option<DispatchOutcome>],
) -> Result<(), DispatchError> {
    while let Some(joined) = tasks.join_next().await {
        let (index, outcome) = joined.map_err(|e| DispatchError::TaskFailed(e.to_string()))?;
        outcomes[index] = Some(outcome);
    }
    Ok(())
}
