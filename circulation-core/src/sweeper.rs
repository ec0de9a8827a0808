//! Periodic expiration of stale reservations
//!
//! The sweeper snapshots the pending set, then re-validates each candidate
//! under its book's coordinator lock before cancelling. Reservations created
//! after the snapshot are left for the next run. A held execution token makes
//! runs single-flight: an overlapping invocation is skipped, not queued.

use crate::clock::Clock;
use crate::coordinator::BookCoordinator;
use crate::store::CirculationStore;
use crate::types::ReservationStatus;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Duration;
use uuid::Uuid;

/// Outcome of one sweep run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Pending reservations inspected
    pub scanned: usize,

    /// Reservations transitioned to Cancelled by this run
    pub cancelled: usize,

    /// True when another run held the execution token and this one did nothing
    pub skipped: bool,
}

/// Retires pending reservations whose expiration date has passed
pub struct ExpirationSweeper {
    store: Arc<dyn CirculationStore>,
    clock: Arc<dyn Clock>,
    coordinator: Arc<BookCoordinator>,
    running: AtomicBool,
}

impl ExpirationSweeper {
    /// Create a sweeper over the given store and coordinator
    pub fn new(
        store: Arc<dyn CirculationStore>,
        clock: Arc<dyn Clock>,
        coordinator: Arc<BookCoordinator>,
    ) -> Self {
        Self {
            store,
            clock,
            coordinator,
            running: AtomicBool::new(false),
        }
    }

    /// Cancel every pending reservation expired as of `now`
    ///
    /// Idempotent: a second run over the same data with the same `now`
    /// cancels nothing. A reservation cancelled concurrently by its owner is
    /// skipped without error (it already ended Cancelled exactly once).
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("sweep already in flight, skipping");
            return Ok(SweepReport {
                scanned: 0,
                cancelled: 0,
                skipped: true,
            });
        }

        let result = self.sweep_inner(now).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn sweep_inner(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        // Snapshot-at-start: only these candidates are eligible this run
        let pending = self.store.pending_reservations()?;
        let scanned = pending.len();

        let mut expired_by_book: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for reservation in pending {
            if reservation.is_expired(now) {
                expired_by_book
                    .entry(reservation.book_id)
                    .or_default()
                    .push(reservation.reservation_id);
            }
        }

        let mut cancelled = 0;
        for (book_id, reservation_ids) in expired_by_book {
            cancelled += self
                .coordinator
                .with_book(book_id, || self.cancel_expired(&reservation_ids, now))
                .await?;
        }

        if cancelled > 0 {
            tracing::info!(scanned, cancelled, "expired reservations swept");
        }

        Ok(SweepReport {
            scanned,
            cancelled,
            skipped: false,
        })
    }

    /// Re-check and cancel candidates while holding the book's lock
    fn cancel_expired(&self, reservation_ids: &[Uuid], now: DateTime<Utc>) -> Result<usize> {
        let mut cancelled = 0;
        for &reservation_id in reservation_ids {
            let Some(mut reservation) = self.store.find_reservation(reservation_id)? else {
                continue;
            };
            // Still pending and still expired? A concurrent manual cancel or
            // fulfillment between snapshot and here makes this a no-op.
            if reservation.status != ReservationStatus::Pending || !reservation.is_expired(now) {
                continue;
            }

            reservation.status = ReservationStatus::Cancelled;
            self.store.save_reservation(&reservation)?;
            cancelled += 1;

            tracing::debug!(reservation_id = %reservation_id, "expired reservation cancelled");
        }
        Ok(cancelled)
    }

    /// Spawn the periodic sweep task
    ///
    /// Intended cadence is once per day; failures are logged and the loop
    /// keeps running.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so the cadence starts
            // one full interval out.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let now = self.clock.now();
                match self.sweep_expired(now).await {
                    Ok(report) if !report.skipped => {
                        tracing::debug!(
                            scanned = report.scanned,
                            cancelled = report.cancelled,
                            "scheduled sweep completed"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("scheduled sweep failed: {}", e);
                    }
                }
            }
        })
    }
}
