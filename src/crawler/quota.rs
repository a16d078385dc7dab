//! Global page budget shared by all workers
//!
//! A worker reserves a [`QuotaSlot`] before fetching and later either
//! confirms it (the fetch produced a visited or checked page) or lets it go
//! (the fetch failed, was a redirect, or the entry was abandoned). Reserved
//! plus confirmed never exceeds the limit, so no more than `limit` pages are
//! ever handed to callbacks.

use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Slots {
    confirmed: u64,
    reserved: u64,
}

/// Page budget with reservation
#[derive(Debug)]
pub struct QuotaGate {
    limit: Option<u64>,
    slots: Mutex<Slots>,
    released: Notify,
}

impl QuotaGate {
    /// Creates a gate; `None` means unlimited
    pub fn new(limit: Option<u64>) -> Self {
        Self {
            limit,
            slots: Mutex::new(Slots::default()),
            released: Notify::new(),
        }
    }

    /// Reserves a slot for one fetch
    ///
    /// While the budget is fully reserved but not yet used up, waits for a
    /// reservation to be confirmed or released.
    ///
    /// # Returns
    ///
    /// * `Some(QuotaSlot)` - A held slot; dropping it unconfirmed releases it
    /// * `None` - The budget is used up, or `cancel` fired while waiting
    pub async fn reserve(&self, cancel: &CancellationToken) -> Option<QuotaSlot<'_>> {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut slots = self.lock();
                let granted = match self.limit {
                    None => true,
                    Some(limit) if slots.confirmed >= limit => return None,
                    Some(limit) => slots.confirmed + slots.reserved < limit,
                };
                if granted {
                    slots.reserved += 1;
                    return Some(QuotaSlot {
                        gate: self,
                        settled: false,
                    });
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    fn confirm(&self) -> u64 {
        let confirmed = {
            let mut slots = self.lock();
            slots.reserved = slots.reserved.saturating_sub(1);
            slots.confirmed += 1;
            slots.confirmed
        };
        self.released.notify_waiters();
        confirmed
    }

    fn release(&self) {
        {
            let mut slots = self.lock();
            slots.reserved = slots.reserved.saturating_sub(1);
        }
        self.released.notify_waiters();
    }

    /// Pages counted so far
    pub fn confirmed(&self) -> u64 {
        self.lock().confirmed
    }

    /// True once the confirmed count has reached the limit
    pub fn is_exhausted(&self) -> bool {
        self.limit
            .map_or(false, |limit| self.lock().confirmed >= limit)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One reserved page; released on drop unless confirmed
#[derive(Debug)]
#[must_use = "dropping a slot releases it"]
pub struct QuotaSlot<'a> {
    gate: &'a QuotaGate,
    settled: bool,
}

impl QuotaSlot<'_> {
    /// Counts the reserved page
    ///
    /// # Returns
    ///
    /// The confirmed count after this page
    pub fn confirm(mut self) -> u64 {
        self.settled = true;
        self.gate.confirm()
    }
}

impl Drop for QuotaSlot<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.gate.release();
        }
    }
}
