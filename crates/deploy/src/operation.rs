//! Per-operation state machine and event gate.
//!
//! Progress arrives on the transport's worker thread while status changes
//! happen on the caller's task. Both go through the same lock, so the
//! emitted sequence is always `Started`, ticks, terminal status, and no tick
//! can slip out once the operation left `Running` or its token fired.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::events::WeakEventBus;
use crate::types::{
    DeployEvent, Milestone, OperationState, ProgressEvent, ProgressKind, StatusEvent,
};

/// Converts a transport percentage to an integer in `0..=100`.
pub(crate) fn normalize_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 100.0).round() as u8
}

/// One running install or push.
pub(crate) struct Operation {
    id: Uuid,
    kind: ProgressKind,
    current_file: String,
    bus: WeakEventBus,
    progress_tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
    cancel: CancellationToken,
    inner: Mutex<Inner>,
}

struct Inner {
    state: OperationState,
    last_percent: Option<u8>,
    last_bytes: u64,
    total_bytes: u64,
}

impl Operation {
    pub(crate) fn new(
        kind: ProgressKind,
        current_file: String,
        bus: WeakEventBus,
        progress_tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            current_file,
            bus,
            progress_tx,
            cancel,
            inner: Mutex::new(Inner {
                state: OperationState::Idle,
                last_percent: None,
                last_bytes: 0,
                total_bytes: 0,
            }),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn state(&self) -> OperationState {
        self.lock().state
    }

    /// Idle → Running, announcing `message`.
    pub(crate) fn start(&self, message: String) {
        let mut inner = self.lock();
        if inner.state != OperationState::Idle {
            return;
        }
        inner.state = OperationState::Running;
        debug!(operation = %self.id, kind = ?self.kind, "operation running");
        self.status(Milestone::Started, message);
    }

    /// Emits a progress tick unless the operation is no longer running.
    ///
    /// `percent` is held at the highest value already emitted. Returns
    /// whether the tick went out.
    pub(crate) fn progress(
        &self,
        percent: u8,
        bytes_transferred: u64,
        total_bytes: u64,
        message: String,
    ) -> bool {
        let mut inner = self.lock();
        if inner.state != OperationState::Running || self.cancel.is_cancelled() {
            return false;
        }

        let percent = inner.last_percent.map_or(percent, |last| last.max(percent));
        inner.last_percent = Some(percent);
        inner.last_bytes = bytes_transferred;
        inner.total_bytes = total_bytes;
        trace!(operation = %self.id, percent, bytes_transferred, total_bytes, "progress");

        let event = ProgressEvent {
            operation: self.id,
            kind: self.kind,
            percent,
            bytes_transferred,
            total_bytes,
            message,
            current_file: self.current_file.clone(),
        };
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(event.clone());
        }
        self.bus.publish(DeployEvent::Progress(event));
        true
    }

    /// Running → Succeeded. Tops the progress up to 100% first if the
    /// transport stopped reporting short of it.
    pub(crate) fn succeed(&self, message: String, completion_message: String) {
        let needs_final_tick = {
            let inner = self.lock();
            inner.last_percent.is_none_or(|p| p < 100)
        };
        if needs_final_tick {
            let (bytes, total) = {
                let inner = self.lock();
                (inner.total_bytes.max(inner.last_bytes), inner.total_bytes)
            };
            self.progress(100, bytes, total, completion_message);
        }
        self.finish(OperationState::Succeeded, Milestone::Finished, message);
    }

    /// Running → Failed.
    pub(crate) fn fail(&self, message: String) {
        self.finish(OperationState::Failed, Milestone::Failed, message);
    }

    /// Running → Cancelled.
    pub(crate) fn cancelled(&self, message: String) {
        self.finish(OperationState::Cancelled, Milestone::Cancelled, message);
    }

    fn finish(&self, state: OperationState, milestone: Milestone, message: String) {
        let mut inner = self.lock();
        if inner.state != OperationState::Running {
            return;
        }
        inner.state = state;
        debug!(operation = %self.id, ?state, "operation finished");
        self.status(milestone, message);
    }

    // Callers hold the lock.
    fn status(&self, milestone: Milestone, message: String) {
        self.bus.publish(DeployEvent::Status(StatusEvent {
            operation: self.id,
            milestone,
            message,
        }));
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;

    fn op(bus: &EventBus) -> Operation {
        Operation::new(
            ProgressKind::Install,
            "app.apk".into(),
            bus.downgrade(),
            None,
            CancellationToken::new(),
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<DeployEvent>) -> Vec<DeployEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    fn percents(events: &[DeployEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                DeployEvent::Progress(p) => Some(p.percent),
                DeployEvent::Status(_) => None,
            })
            .collect()
    }

    #[test]
    fn normalize_clamps_and_rounds() {
        assert_eq!(normalize_percent(-3.0), 0);
        assert_eq!(normalize_percent(49.6), 50);
        assert_eq!(normalize_percent(100.0), 100);
        assert_eq!(normalize_percent(250.0), 100);
        assert_eq!(normalize_percent(f64::NAN), 0);
    }

    #[test]
    fn progress_before_start_is_dropped() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let op = op(&bus);

        assert!(!op.progress(10, 0, 0, "early".into()));
        assert_eq!(op.state(), OperationState::Idle);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn lifecycle_idle_running_succeeded() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let op = op(&bus);

        op.start("starting".into());
        assert_eq!(op.state(), OperationState::Running);
        op.progress(40, 0, 0, "tick".into());
        op.succeed("finished".into(), "done".into());
        assert_eq!(op.state(), OperationState::Succeeded);

        let events = drain(&mut rx);
        assert_eq!(percents(&events), vec![40, 100]);
        assert!(matches!(&events[0], DeployEvent::Status(s) if s.milestone == Milestone::Started));
        assert!(
            matches!(events.last(), Some(DeployEvent::Status(s)) if s.milestone == Milestone::Finished)
        );
    }

    #[test]
    fn percent_never_decreases() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let op = op(&bus);

        op.start("starting".into());
        for p in [10, 30, 20, 60, 59, 100] {
            op.progress(p, 0, 0, "tick".into());
        }

        assert_eq!(percents(&drain(&mut rx)), vec![10, 30, 30, 60, 60, 100]);
    }

    #[test]
    fn succeed_at_100_adds_no_extra_tick() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let op = op(&bus);

        op.start("starting".into());
        op.progress(100, 4096, 4096, "tick".into());
        op.succeed("finished".into(), "done".into());

        assert_eq!(percents(&drain(&mut rx)), vec![100]);
    }

    #[test]
    fn final_tick_fills_byte_counter() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let op = op(&bus);

        op.start("starting".into());
        op.progress(0, 0, 10, "initial".into());
        op.succeed("finished".into(), "done".into());

        let events = drain(&mut rx);
        match &events[2] {
            DeployEvent::Progress(p) => {
                assert_eq!(p.percent, 100);
                assert_eq!(p.bytes_transferred, 10);
                assert_eq!(p.total_bytes, 10);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn no_progress_after_cancel() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let op = op(&bus);

        op.start("starting".into());
        op.progress(10, 0, 0, "tick".into());
        op.cancel_token().cancel();
        assert!(!op.progress(20, 0, 0, "late".into()));
        op.cancelled("cancelled".into());
        assert!(!op.progress(30, 0, 0, "later".into()));

        let events = drain(&mut rx);
        assert_eq!(percents(&events), vec![10]);
        assert!(
            matches!(events.last(), Some(DeployEvent::Status(s)) if s.milestone == Milestone::Cancelled)
        );
        assert_eq!(op.state(), OperationState::Cancelled);
    }

    #[test]
    fn terminal_state_is_sticky() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let op = op(&bus);

        op.start("starting".into());
        op.fail("boom".into());
        op.succeed("finished".into(), "done".into());
        op.start("again".into());

        assert_eq!(op.state(), OperationState::Failed);
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[test]
    fn per_call_receiver_gets_progress_only() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let op = Operation::new(
            ProgressKind::FileCopy,
            "data.zip".into(),
            bus.downgrade(),
            Some(tx),
            CancellationToken::new(),
        );

        op.start("starting".into());
        op.progress(50, 2, 4, "tick".into());

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, ProgressKind::FileCopy);
        assert_eq!(event.current_file, "data.zip");
        assert_eq!(event.operation, op.id());
        assert!(rx.try_recv().is_err());
    }
}
