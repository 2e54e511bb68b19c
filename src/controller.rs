//! Fishing cycle controller.
//!
//! Owns the session state: whether the cycle is active, the handle of the
//! repeating ticker, and the target conversation. All transitions happen
//! under one lock, so `toggle()` can never interleave with `start()` or
//! `stop()`.
//!
//! Ticks fire at a fixed period measured from `start()`. Every send runs in
//! its own task, so a slow send never delays the next tick.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::events::{EventSink, Status};
use crate::transport::{ChatTransport, Target};

/// Slash command issued on every tick.
pub const FISH_COMMAND: &str = "fish";

/// Result of [`FishingController::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyActive,
    /// No target conversation is known yet.
    NotReady,
}

/// Result of [`FishingController::toggle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Started,
    Stopped,
    NotReady,
}

/// Mutable session state. `ticker.is_some() == active` at all times.
#[derive(Default)]
struct SessionState {
    active: bool,
    ticker: Option<JoinHandle<()>>,
    target: Option<Target>,
}

/// Drives the repeating fish command.
pub struct FishingController {
    transport: Arc<dyn ChatTransport>,
    sink: Arc<dyn EventSink>,
    bot_id: String,
    period: Duration,
    state: Mutex<SessionState>,
}

impl FishingController {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        sink: Arc<dyn EventSink>,
        bot_id: impl Into<String>,
        period: Duration,
    ) -> Self {
        Self {
            transport,
            sink,
            bot_id: bot_id.into(),
            period,
            state: Mutex::new(SessionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Transitions are plain field writes; a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn target(&self) -> Option<Target> {
        self.lock().target.clone()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Remember the target conversation. A running cycle keeps its target
    /// until it is restarted.
    pub fn set_target(&self, target: Target) {
        self.lock().target = Some(target);
    }

    /// Start the cycle, optionally switching to a new target first.
    pub fn start(&self, target: Option<Target>) -> StartOutcome {
        let mut state = self.lock();
        self.start_locked(&mut state, target)
    }

    /// Stop the cycle. Returns whether it was running.
    pub fn stop(&self) -> bool {
        let mut state = self.lock();
        self.stop_locked(&mut state)
    }

    /// Stop if active, otherwise start.
    pub fn toggle(&self, target: Option<Target>) -> ToggleOutcome {
        let mut state = self.lock();
        if state.active {
            self.stop_locked(&mut state);
            ToggleOutcome::Stopped
        } else {
            match self.start_locked(&mut state, target) {
                StartOutcome::NotReady => ToggleOutcome::NotReady,
                StartOutcome::Started | StartOutcome::AlreadyActive => ToggleOutcome::Started,
            }
        }
    }

    fn start_locked(&self, state: &mut SessionState, target: Option<Target>) -> StartOutcome {
        if state.active {
            return StartOutcome::AlreadyActive;
        }
        if let Some(target) = target {
            state.target = Some(target);
        }
        let Some(target) = state.target.clone() else {
            debug!("Start requested without a target");
            return StartOutcome::NotReady;
        };

        info!(channel = %target.name, period_ms = self.period.as_millis() as u64, "Started fishing");

        // First send goes out now; the ticker covers every later one.
        spawn_send(
            Arc::clone(&self.transport),
            Arc::clone(&self.sink),
            target.clone(),
            self.bot_id.clone(),
        );

        let transport = Arc::clone(&self.transport);
        let sink = Arc::clone(&self.sink);
        let bot_id = self.bot_id.clone();
        let period = self.period;
        let first_tick = Instant::now() + period;

        let ticker = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                ticker.tick().await;
                spawn_send(
                    Arc::clone(&transport),
                    Arc::clone(&sink),
                    target.clone(),
                    bot_id.clone(),
                );
            }
        });

        state.active = true;
        state.ticker = Some(ticker);
        self.sink.on_status(Status::Fishing);
        StartOutcome::Started
    }

    fn stop_locked(&self, state: &mut SessionState) -> bool {
        if !state.active {
            return false;
        }
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        state.active = false;
        info!("Stopped fishing session");
        self.sink.on_status(Status::NotFishing);
        true
    }
}

impl Drop for FishingController {
    fn drop(&mut self) {
        if let Some(ticker) = self.lock().ticker.take() {
            ticker.abort();
        }
    }
}

/// Fire-and-forget fish command. Failures are reported, never propagated.
fn spawn_send(
    transport: Arc<dyn ChatTransport>,
    sink: Arc<dyn EventSink>,
    target: Target,
    bot_id: String,
) {
    tokio::spawn(async move {
        match transport
            .send_slash(&target, &bot_id, FISH_COMMAND, &[])
            .await
        {
            Ok(()) => debug!(channel = %target.name, "Sent fishing command"),
            Err(e) => {
                error!(channel = %target.name, "Error sending fishing command: {e}");
                sink.on_log(&format!("❌ Error sending fishing command: {e}"));
            }
        }
    });
}
