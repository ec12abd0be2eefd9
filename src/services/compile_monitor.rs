//! Compile pass tracking.
//!
//! Two independent signals report the host's compilation lifecycle:
//!
//! - **Poll**: [`CompilePassMonitor::poll`] samples [`CompilerHost::is_compiling`] on every tick.
//!   A rising edge starts a pass.
//! - **Events**: [`CompilerEvent`]s from the compiler integration. A unit result arriving while
//!   idle starts a pass; [`CompilerEvent::PassCompleted`] finalizes it.
//!
//! Either signal may arrive first. All of them feed one state machine keyed by a monotonically
//! increasing pass id: a start signal while a pass is active is coalesced into it, and a
//! completion with no active pass is a duplicate and ignored. The poll's falling edge never
//! finalizes a pass; only the completion event carries the per-unit errors.
//!
//! Finalized results are published on a `tokio::sync::watch` channel, which is what
//! [`CompilePassMonitor::wait_for_next_pass`] suspends on. Waiting has no timeout; a pass
//! that never completes leaves the waiter suspended.

use crate::host::{CompilerEvent, CompilerHost, CompilerMessage};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Identifier of a compile pass; 0 means no pass has completed yet
pub type PassId = u64;

/// Frozen snapshot of a completed compile pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassResult {
    pub pass_id: PassId,
    pub had_errors: bool,
    /// Units that reported at least one error, sorted
    pub errored_units: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
    Idle,
    Active,
}

#[derive(Debug, Clone, Copy)]
enum StartSignal {
    Poll,
    UnitCompiled,
    Requested,
}

struct ActivePass {
    id: PassId,
    had_errors: bool,
    /// Keyed by lowercased unit name so the same unit is counted once
    errored_units: BTreeMap<String, String>,
}

struct MonitorState {
    next_pass_id: PassId,
    active: Option<ActivePass>,
    host_was_compiling: bool,
    /// Units reported in the active pass, for the completion log line
    units_seen: usize,
}

/// Observes the host's compile lifecycle and answers "did the last build have errors"
pub struct CompilePassMonitor {
    host: Arc<dyn CompilerHost>,
    state: Mutex<MonitorState>,
    last_tx: watch::Sender<PassResult>,
}

impl CompilePassMonitor {
    pub fn new(host: Arc<dyn CompilerHost>) -> Self {
        let (last_tx, _) = watch::channel(PassResult::default());
        Self {
            host,
            state: Mutex::new(MonitorState {
                next_pass_id: 1,
                active: None,
                host_was_compiling: false,
                units_seen: 0,
            }),
            last_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> PassStatus {
        if self.lock().active.is_some() {
            PassStatus::Active
        } else {
            PassStatus::Idle
        }
    }

    /// Snapshot of the most recently completed pass; no side effects
    pub fn last_pass_result(&self) -> PassResult {
        self.last_tx.borrow().clone()
    }

    /// Receiver that observes every finalized pass
    pub fn subscribe(&self) -> watch::Receiver<PassResult> {
        self.last_tx.subscribe()
    }

    /// Periodic liveness check against the host
    pub fn poll(&self) {
        let compiling = self.host.is_compiling();
        let mut state = self.lock();

        if compiling && !state.host_was_compiling {
            state.host_was_compiling = true;
            Self::begin_pass(&mut state, StartSignal::Poll);
        } else if !compiling && state.host_was_compiling {
            state.host_was_compiling = false;
            tracing::debug!("Host stopped compiling; waiting for the completion event");
        }
    }

    /// A unit finished compiling; any error message marks the unit as errored
    pub fn on_unit_compiled(&self, unit: &str, messages: &[CompilerMessage]) {
        let mut state = self.lock();
        Self::begin_pass(&mut state, StartSignal::UnitCompiled);
        state.units_seen += 1;

        let Some(pass) = state.active.as_mut() else {
            return;
        };

        let errors = messages.iter().filter(|m| m.is_error()).count();
        if errors > 0 {
            pass.had_errors = true;
            pass.errored_units
                .entry(unit.to_lowercase())
                .or_insert_with(|| unit.to_string());
            tracing::warn!("Unit {} compiled with {} error(s)", unit, errors);
            for message in messages.iter().filter(|m| m.is_error()) {
                tracing::debug!("{}: {}", unit, message.message);
            }
        } else {
            tracing::debug!("Unit {} compiled cleanly", unit);
        }
    }

    /// The host finished a compile pass; freezes the result and wakes waiters
    pub fn on_pass_completed(&self) {
        let (result, units_seen) = {
            let mut state = self.lock();
            let Some(pass) = state.active.take() else {
                tracing::debug!("Ignoring completion signal with no active pass");
                return;
            };
            let units_seen = std::mem::take(&mut state.units_seen);

            let result = PassResult {
                pass_id: pass.id,
                had_errors: pass.had_errors,
                errored_units: pass.errored_units.into_values().collect(),
            };
            (result, units_seen)
        };

        if result.had_errors {
            tracing::warn!(
                "Compile pass {} finished with errors in: {}",
                result.pass_id,
                result.errored_units.join(", ")
            );
        } else {
            tracing::info!(
                "Compile pass {} finished cleanly ({} units)",
                result.pass_id,
                units_seen
            );
        }

        self.last_tx.send_replace(result);
    }

    pub fn handle_event(&self, event: CompilerEvent) {
        match event {
            CompilerEvent::UnitCompiled { unit, messages } => {
                self.on_unit_compiled(&unit, &messages)
            }
            CompilerEvent::PassCompleted => self.on_pass_completed(),
        }
    }

    /// Forward compiler events from a channel into this monitor
    ///
    /// Events are applied one at a time in arrival order. The task ends when every
    /// sender is dropped.
    pub fn attach(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<CompilerEvent>,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                monitor.handle_event(event);
            }
            tracing::debug!("Compiler event channel closed");
        })
    }

    /// Wait for the next compile pass to complete
    ///
    /// With no active pass and `trigger_recompile` false this returns the last result
    /// immediately. With `trigger_recompile` a pass is armed and a recompile requested;
    /// if the host schedules nothing the armed pass is dropped and the last result returned.
    /// Otherwise the caller is suspended, without blocking other tasks, until the pass
    /// completes.
    pub async fn wait_for_next_pass(&self, trigger_recompile: bool) -> PassResult {
        let mut rx = self.last_tx.subscribe();

        let target = if trigger_recompile {
            let (id, created) = {
                let mut state = self.lock();
                Self::begin_pass(&mut state, StartSignal::Requested)
            };

            if !self.host.request_recompile() {
                if created {
                    self.abandon_pass(id);
                    tracing::info!("Host scheduled no compile cycle; using last pass result");
                    return self.last_pass_result();
                }
                tracing::debug!("Recompile request declined; waiting on active pass {}", id);
            }
            id
        } else {
            match self.lock().active.as_ref() {
                Some(pass) => pass.id,
                None => return self.last_pass_result(),
            }
        };

        tracing::debug!("Waiting for compile pass {}", target);
        match rx.wait_for(|result| result.pass_id >= target).await {
            Ok(result) => result.clone(),
            Err(_) => self.last_pass_result(),
        }
    }

    /// Start a pass unless one is active; returns the active pass id and whether it is new
    fn begin_pass(state: &mut MonitorState, signal: StartSignal) -> (PassId, bool) {
        if let Some(pass) = &state.active {
            tracing::trace!("Start signal {:?} coalesced into pass {}", signal, pass.id);
            return (pass.id, false);
        }

        let id = state.next_pass_id;
        state.next_pass_id += 1;
        state.units_seen = 0;
        state.active = Some(ActivePass {
            id,
            had_errors: false,
            errored_units: BTreeMap::new(),
        });

        tracing::info!("Compile pass {} started ({:?})", id, signal);
        (id, true)
    }

    /// Drop an armed pass that never received any unit results
    fn abandon_pass(&self, id: PassId) {
        let mut state = self.lock();
        let untouched = state
            .active
            .as_ref()
            .is_some_and(|pass| pass.id == id && state.units_seen == 0);
        if untouched {
            state.active = None;
        }
    }
}
