//! Reconciliation state machine
//!
//! Holds the one piece of state the process owns: what the outlet was last
//! successfully commanded to. Every observation goes through [`Reconciler::reconcile`]
//! under a single async mutex, so the event path and the periodic path can
//! never interleave a read-compare-command sequence.
//!
//! The state is only updated after the actuator confirmed the command. A failed
//! command leaves it untouched, so the next observation with the same value
//! issues the command again.

use crate::client::SwitchActuator;
use crate::error::Result;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Commanded state of the outlet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwitchState {
    /// At least one valve open, outlet commanded on
    Open,
    /// All valves closed, outlet commanded off
    Closed,
}

impl SwitchState {
    pub fn from_any_open(any_open: bool) -> Self {
        if any_open {
            SwitchState::Open
        } else {
            SwitchState::Closed
        }
    }

    /// Whether the outlet is on in this state
    pub fn is_on(self) -> bool {
        self == SwitchState::Open
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchState::Open => write!(f, "open"),
            SwitchState::Closed => write!(f, "closed"),
        }
    }
}

/// Which trigger produced an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TriggerSource {
    /// Push notification
    Event,
    /// Fixed-interval full sync
    PeriodicSync,
    /// Full sync before the loops start
    Startup,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Event => write!(f, "event"),
            TriggerSource::PeriodicSync => write!(f, "sync"),
            TriggerSource::Startup => write!(f, "startup"),
        }
    }
}

/// Outcome of one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Observation matched the current state; nothing was sent
    Unchanged(SwitchState),
    /// The outlet was switched
    Switched { from: SwitchState, to: SwitchState },
}

impl Transition {
    pub fn is_switch(&self) -> bool {
        matches!(self, Transition::Switched { .. })
    }

    /// State after the reconciliation
    pub fn state(&self) -> SwitchState {
        match self {
            Transition::Unchanged(state) => *state,
            Transition::Switched { to, .. } => *to,
        }
    }
}

/// Command counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcilerStats {
    pub commands_issued: u64,
    pub commands_failed: u64,
    pub last_transition: Option<chrono::DateTime<chrono::Utc>>,
}

struct ReconcilerState {
    switch_state: SwitchState,
    stats: ReconcilerStats,
}

/// Single writer of actuator commands
pub struct Reconciler {
    state: Mutex<ReconcilerState>,
    actuator: Arc<dyn SwitchActuator>,
}

impl Reconciler {
    /// Start in `Closed`; nothing is sent until the first differing observation
    pub fn new(actuator: Arc<dyn SwitchActuator>) -> Self {
        Self {
            state: Mutex::new(ReconcilerState {
                switch_state: SwitchState::Closed,
                stats: ReconcilerStats::default(),
            }),
            actuator,
        }
    }

    /// Feed one aggregate observation.
    ///
    /// Sends at most one command, and only when the observation differs from
    /// the current state. Actuator errors are returned unchanged and leave the
    /// state as it was.
    pub async fn reconcile(&self, any_open: bool, source: TriggerSource) -> Result<Transition> {
        let mut state = self.state.lock().await;
        let desired = SwitchState::from_any_open(any_open);

        if state.switch_state == desired {
            debug!(source = %source, state = %desired, "Valves still {}, nothing to do", desired);
            return Ok(Transition::Unchanged(desired));
        }

        if let Err(e) = self.actuator.set_switch_state(desired.is_on()).await {
            state.stats.commands_failed += 1;
            warn!(
                source = %source,
                state = %state.switch_state,
                plug = self.actuator.label(),
                error_type = e.error_type(),
                "Switching plug {} failed, keeping state {}: {}",
                on_off(desired),
                state.switch_state,
                e
            );
            return Err(e);
        }

        let from = std::mem::replace(&mut state.switch_state, desired);
        state.stats.commands_issued += 1;
        state.stats.last_transition = Some(chrono::Utc::now());

        info!(
            source = %source,
            state = %desired,
            plug = self.actuator.label(),
            "🔥 Valves {} → plug {} (from {})",
            desired,
            on_off(desired),
            source
        );
        Ok(Transition::Switched { from, to: desired })
    }

    /// Current commanded state
    pub async fn current_state(&self) -> SwitchState {
        self.state.lock().await.switch_state
    }

    pub async fn stats(&self) -> ReconcilerStats {
        self.state.lock().await.stats.clone()
    }
}

fn on_off(state: SwitchState) -> &'static str {
    if state.is_on() {
        "on"
    } else {
        "off"
    }
}
