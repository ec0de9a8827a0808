//! Borrow record lifecycle
//!
//! State machine for a single lending request:
//!
//! ```text
//! Pending ──approve──▶ Borrowed ──return──▶ Returned
//!    │
//!    └───reject──▶ Rejected
//! ```
//!
//! The physical copy is reserved at approval, not at request time; a request
//! can therefore be filed against a book with zero stock and simply fail at
//! approval. Counter moves go through [`InventoryLedger`] and are expected to
//! run under the book's coordinator lock.

use crate::clock::Clock;
use crate::inventory::InventoryLedger;
use crate::store::CirculationStore;
use crate::types::{BorrowRecord, BorrowStatus};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Owner of borrow record status transitions
#[derive(Clone)]
pub struct BorrowLifecycle {
    store: Arc<dyn CirculationStore>,
    clock: Arc<dyn Clock>,
    ledger: InventoryLedger,
}

impl BorrowLifecycle {
    /// Create a lifecycle over the given store
    pub fn new(store: Arc<dyn CirculationStore>, clock: Arc<dyn Clock>) -> Self {
        let ledger = InventoryLedger::new(store.clone(), clock.clone());
        Self { store, clock, ledger }
    }

    /// The inventory ledger this lifecycle drives
    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    /// File a new borrow request in `Pending`
    ///
    /// No ledger effect: availability is checked at approval time only.
    pub fn create_request(
        &self,
        user_id: Uuid,
        book_id: Uuid,
        due_date: DateTime<Utc>,
    ) -> Result<BorrowRecord> {
        self.store
            .find_member(user_id)?
            .ok_or_else(|| Error::NotFound(format!("member {}", user_id)))?;
        self.store
            .find_book(book_id)?
            .ok_or_else(|| Error::NotFound(format!("book {}", book_id)))?;

        let record = BorrowRecord {
            record_id: Uuid::new_v4(),
            book_id,
            user_id,
            borrow_date: self.clock.now(),
            due_date,
            return_date: None,
            rejection_reason: None,
            status: BorrowStatus::Pending,
        };
        self.store.save_borrow(&record)?;

        tracing::info!(record_id = %record.record_id, book_id = %book_id, user_id = %user_id, "borrow request filed");

        Ok(record)
    }

    /// Approve a pending request, taking one copy off the shelf
    ///
    /// On `OutOfStock` the record stays `Pending` and nothing changes.
    pub fn approve(&self, record_id: Uuid) -> Result<BorrowRecord> {
        let mut record = self.load(record_id)?;
        self.require_status(&record, BorrowStatus::Pending)?;

        self.ledger.reserve_copy(record.book_id)?;

        record.status = BorrowStatus::Borrowed;
        if let Err(e) = self.store.save_borrow(&record) {
            // Undo the counter move so a failed save leaves no partial effect
            let _ = self.ledger.release_copy(record.book_id);
            return Err(e);
        }

        tracing::info!(record_id = %record_id, book_id = %record.book_id, "borrow approved");

        Ok(record)
    }

    /// Reject a pending request; no ledger effect
    pub fn reject(&self, record_id: Uuid, reason: impl Into<String>) -> Result<BorrowRecord> {
        let mut record = self.load(record_id)?;
        self.require_status(&record, BorrowStatus::Pending)?;

        record.status = BorrowStatus::Rejected;
        record.rejection_reason = Some(reason.into());
        self.store.save_borrow(&record)?;

        tracing::info!(record_id = %record_id, "borrow rejected");

        Ok(record)
    }

    /// Return a borrowed copy to the shelf
    ///
    /// The caller (the engine) follows up with the reservation queue's
    /// fulfillment candidate check, since a copy just became free.
    pub fn return_book(&self, record_id: Uuid) -> Result<BorrowRecord> {
        let mut record = self.load(record_id)?;
        self.require_status(&record, BorrowStatus::Borrowed)?;

        self.ledger.release_copy(record.book_id)?;

        record.status = BorrowStatus::Returned;
        record.return_date = Some(self.clock.now());
        if let Err(e) = self.store.save_borrow(&record) {
            let _ = self.ledger.reserve_copy(record.book_id);
            return Err(e);
        }

        tracing::info!(record_id = %record_id, book_id = %record.book_id, "book returned");

        Ok(record)
    }

    /// Borrowed records whose due date has passed
    pub fn overdue_records(&self, now: DateTime<Utc>) -> Result<Vec<BorrowRecord>> {
        self.store.overdue_borrows(now)
    }

    fn load(&self, record_id: Uuid) -> Result<BorrowRecord> {
        self.store
            .find_borrow(record_id)?
            .ok_or_else(|| Error::NotFound(format!("borrow record {}", record_id)))
    }

    fn require_status(&self, record: &BorrowRecord, expected: BorrowStatus) -> Result<()> {
        if record.status == expected {
            return Ok(());
        }
        if record.is_terminal() {
            return Err(Error::InvalidState(format!(
                "borrow record {} already settled as {:?}",
                record.record_id, record.status
            )));
        }
        Err(Error::InvalidState(format!(
            "borrow record {} is {:?}, expected {:?}",
            record.record_id, record.status, expected
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{BookStore, BorrowStore, MemberStore, MemoryStore};
    use crate::types::{Book, BookStatus, Member};
    use chrono::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        lifecycle: BorrowLifecycle,
        book_id: Uuid,
        user_id: Uuid,
    }

    fn setup(total_copies: u32) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let book = Book::new(
            "A Wizard of Earthsea",
            "Ursula K. Le Guin",
            "9780547773742",
            total_copies,
            BookStatus::Available,
            clock.now(),
        );
        store.save_book(&book).unwrap();

        let member = Member::new("Ged");
        store.save_member(&member).unwrap();

        let lifecycle = BorrowLifecycle::new(store.clone(), clock.clone());
        Fixture {
            store,
            clock,
            lifecycle,
            book_id: book.book_id,
            user_id: member.member_id,
        }
    }

    fn due(fx: &Fixture) -> DateTime<Utc> {
        fx.clock.now() + Duration::days(14)
    }

    #[test]
    fn test_request_does_not_touch_counters() {
        let fx = setup(0);

        // Zero stock: the request is still accepted
        let record = fx
            .lifecycle
            .create_request(fx.user_id, fx.book_id, due(&fx))
            .unwrap();
        assert_eq!(record.status, BorrowStatus::Pending);

        let book = fx.store.find_book(fx.book_id).unwrap().unwrap();
        assert_eq!(book.available_copies, 0);
    }

    #[test]
    fn test_request_unknown_member_or_book() {
        let fx = setup(1);

        let err = fx
            .lifecycle
            .create_request(Uuid::new_v4(), fx.book_id, due(&fx))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = fx
            .lifecycle
            .create_request(fx.user_id, Uuid::new_v4(), due(&fx))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_approve_moves_counter_and_status() {
        let fx = setup(1);
        let record = fx
            .lifecycle
            .create_request(fx.user_id, fx.book_id, due(&fx))
            .unwrap();

        let approved = fx.lifecycle.approve(record.record_id).unwrap();
        assert_eq!(approved.status, BorrowStatus::Borrowed);

        let book = fx.store.find_book(fx.book_id).unwrap().unwrap();
        assert_eq!(book.available_copies, 0);

        // Approving twice is illegal
        let err = fx.lifecycle.approve(record.record_id).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_approve_out_of_stock_leaves_record_pending() {
        let fx = setup(1);
        let first = fx
            .lifecycle
            .create_request(fx.user_id, fx.book_id, due(&fx))
            .unwrap();
        let second = fx
            .lifecycle
            .create_request(fx.user_id, fx.book_id, due(&fx))
            .unwrap();

        fx.lifecycle.approve(first.record_id).unwrap();

        let err = fx.lifecycle.approve(second.record_id).unwrap_err();
        assert!(matches!(err, Error::OutOfStock(_)));

        let record = fx.store.find_borrow(second.record_id).unwrap().unwrap();
        assert_eq!(record.status, BorrowStatus::Pending);
        let book = fx.store.find_book(fx.book_id).unwrap().unwrap();
        assert_eq!(book.available_copies, 0);
    }

    #[test]
    fn test_reject_keeps_reason() {
        let fx = setup(1);
        let record = fx
            .lifecycle
            .create_request(fx.user_id, fx.book_id, due(&fx))
            .unwrap();

        let rejected = fx
            .lifecycle
            .reject(record.record_id, "card expired")
            .unwrap();
        assert_eq!(rejected.status, BorrowStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("card expired"));

        let book = fx.store.find_book(fx.book_id).unwrap().unwrap();
        assert_eq!(book.available_copies, 1);
    }

    #[test]
    fn test_return_is_not_idempotent() {
        let fx = setup(1);
        let record = fx
            .lifecycle
            .create_request(fx.user_id, fx.book_id, due(&fx))
            .unwrap();
        fx.lifecycle.approve(record.record_id).unwrap();

        fx.clock.advance(Duration::days(3));
        let returned = fx.lifecycle.return_book(record.record_id).unwrap();
        assert_eq!(returned.status, BorrowStatus::Returned);
        assert_eq!(returned.return_date, Some(fx.clock.now()));

        let book = fx.store.find_book(fx.book_id).unwrap().unwrap();
        assert_eq!(book.available_copies, 1);

        // Second return fails and changes nothing
        let err = fx.lifecycle.return_book(record.record_id).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        let book = fx.store.find_book(fx.book_id).unwrap().unwrap();
        assert_eq!(book.available_copies, 1);
    }

    #[test]
    fn test_settled_record_rejects_further_transitions() {
        let fx = setup(1);
        let record = fx
            .lifecycle
            .create_request(fx.user_id, fx.book_id, due(&fx))
            .unwrap();
        fx.lifecycle.approve(record.record_id).unwrap();
        fx.lifecycle.return_book(record.record_id).unwrap();

        // Returned is terminal: no transition applies anymore
        let err = fx.lifecycle.approve(record.record_id).unwrap_err();
        assert!(matches!(err, Error::InvalidState(ref msg) if msg.contains("settled")));

        let err = fx
            .lifecycle
            .reject(record.record_id, "too late")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(ref msg) if msg.contains("settled")));
    }

    #[test]
    fn test_overdue_records() {
        let fx = setup(2);
        let record = fx
            .lifecycle
            .create_request(fx.user_id, fx.book_id, fx.clock.now() + Duration::days(14))
            .unwrap();
        fx.lifecycle.approve(record.record_id).unwrap();

        assert!(fx.lifecycle.overdue_records(fx.clock.now()).unwrap().is_empty());

        fx.clock.advance(Duration::days(15));
        let overdue = fx.lifecycle.overdue_records(fx.clock.now()).unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].record_id, record.record_id);
    }
}
