use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::engine::RunController;
use crate::shutdown::{StopReceiver, StopSender, stop_channel};

/// Shared by every connection. Holds the one-run-per-process slot.
pub(super) struct ServerState {
    controller: RunController,
    auth_token: Option<String>,
    active: Mutex<Option<StopSender>>,
}

/// Occupies the active-run slot until dropped.
pub(super) struct ActiveRun<'state> {
    state: &'state ServerState,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        drop(self.state.slot().take());
    }
}

impl ServerState {
    pub(super) const fn new(controller: RunController, auth_token: Option<String>) -> Self {
        Self {
            controller,
            auth_token,
            active: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<StopSender>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) const fn controller(&self) -> &RunController {
        &self.controller
    }

    pub(super) fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub(super) fn is_running(&self) -> bool {
        self.slot().is_some()
    }

    /// Claims the slot, or `None` when a run is already active. The
    /// receiver observes `request_stop`.
    pub(super) fn claim_run(&self) -> Option<(ActiveRun<'_>, StopReceiver)> {
        let mut slot = self.slot();
        if slot.is_some() {
            return None;
        }
        let (stop_tx, stop_rx) = stop_channel();
        *slot = Some(stop_tx);
        drop(slot);
        Some((ActiveRun { state: self }, stop_rx))
    }

    /// Signals the active run to stop ticking. Returns `false` when no run
    /// is active.
    pub(super) fn request_stop(&self) -> bool {
        let slot = self.slot();
        slot.as_ref()
            .is_some_and(|stop_tx| stop_tx.send(()).is_ok())
    }
}
