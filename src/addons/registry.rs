//! Transfer registry.
//!
//! Tracks in-flight transfers by add-on ID and enforces at most one active
//! transfer per ID. All mutation goes through a single lock; the lock is
//! never held across I/O.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// State of one in-flight transfer.
#[derive(Debug)]
struct Transfer {
    /// Serial of the pipeline that owns this slot.
    serial: u64,
    /// Cancellation handle shared with the pipeline.
    token: CancellationToken,
    /// Last reported progress fraction.
    progress: f64,
}

/// Handle given to the pipeline that won the slot for an ID.
#[derive(Debug, Clone)]
pub struct TransferTicket {
    id: String,
    serial: u64,
    token: CancellationToken,
}

impl TransferTicket {
    /// Add-on ID this ticket was issued for.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cancellation token signalled by [`TransferRegistry::cancel`].
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    transfers: HashMap<String, Transfer>,
    next_serial: u64,
}

/// Registry of in-flight transfers keyed by add-on ID.
#[derive(Debug, Default)]
pub struct TransferRegistry {
    state: Mutex<RegistryState>,
}

impl TransferRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a transfer for `id` and returns its ticket.
    ///
    /// Returns `None` without side effects if `id` already has one.
    pub fn try_begin(&self, id: &str) -> Option<TransferTicket> {
        let mut state = self.lock();
        if state.transfers.contains_key(id) {
            debug!("[ADDON-REGISTRY] Transfer for '{}' already active", id);
            return None;
        }

        state.next_serial += 1;
        let serial = state.next_serial;
        let token = CancellationToken::new();
        state.transfers.insert(
            id.to_string(),
            Transfer {
                serial,
                token: token.clone(),
                progress: 0.0,
            },
        );

        debug!("[ADDON-REGISTRY] Began transfer '{}' (#{})", id, serial);
        Some(TransferTicket {
            id: id.to_string(),
            serial,
            token,
        })
    }

    /// Registers a transfer for `id`. Returns false if one is already active.
    pub fn begin(&self, id: &str) -> bool {
        self.try_begin(id).is_some()
    }

    /// Returns true if a transfer for `id` is registered.
    #[must_use]
    pub fn is_active(&self, id: &str) -> bool {
        self.lock().transfers.contains_key(id)
    }

    /// Removes the transfer for `id`, if any.
    pub fn complete(&self, id: &str) {
        if self.lock().transfers.remove(id).is_some() {
            debug!("[ADDON-REGISTRY] Cleared transfer '{}'", id);
        }
    }

    /// Signals cancellation to the transfer for `id` and removes it.
    pub fn cancel(&self, id: &str) {
        let removed = self.lock().transfers.remove(id);
        if let Some(transfer) = removed {
            info!("[ADDON-REGISTRY] Cancelling transfer '{}' (#{})", id, transfer.serial);
            transfer.token.cancel();
        }
    }

    /// Cancels the ticket's transfer if it still owns the slot for its ID.
    ///
    /// Returns false when the transfer already finished or was replaced.
    pub fn cancel_ticket(&self, ticket: &TransferTicket) -> bool {
        let mut state = self.lock();
        let owned = state
            .transfers
            .get(&ticket.id)
            .is_some_and(|t| t.serial == ticket.serial);
        if !owned {
            return false;
        }
        state.transfers.remove(&ticket.id);
        drop(state);

        info!("[ADDON-REGISTRY] Cancelling transfer '{}' (#{})", ticket.id, ticket.serial);
        ticket.token.cancel();
        true
    }

    /// Removes the slot only if it still belongs to `ticket`.
    ///
    /// A pipeline that was cancelled may finish after a new transfer for the
    /// same ID has begun; that newer slot must survive.
    pub fn release(&self, ticket: &TransferTicket) {
        let mut state = self.lock();
        let owned = state
            .transfers
            .get(&ticket.id)
            .is_some_and(|t| t.serial == ticket.serial);
        if owned {
            state.transfers.remove(&ticket.id);
            debug!("[ADDON-REGISTRY] Released transfer '{}' (#{})", ticket.id, ticket.serial);
        }
    }

    /// Stores the latest progress fraction for the ticket's transfer.
    pub fn record_progress(&self, ticket: &TransferTicket, fraction: f64) {
        let mut state = self.lock();
        if let Some(transfer) = state.transfers.get_mut(&ticket.id) {
            if transfer.serial == ticket.serial {
                transfer.progress = fraction;
            }
        }
    }

    /// Returns the last reported progress for `id`, if a transfer is active.
    #[must_use]
    pub fn progress(&self, id: &str) -> Option<f64> {
        self.lock().transfers.get(id).map(|t| t.progress)
    }

    /// Returns the IDs of all active transfers, sorted.
    #[must_use]
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().transfers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the number of active transfers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().transfers.len()
    }

    /// Returns true if no transfer is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
