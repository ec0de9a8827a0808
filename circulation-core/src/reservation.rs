//! Per-book reservation waitlist
//!
//! Reservations are accepted only while a book is `Unavailable`; once a copy
//! is on the shelf, members are expected to borrow directly. The queue is
//! ordered by `reservation_date`, and fulfillment never skips an
//! earlier-dated pending reservation in favor of a later one.

use crate::clock::Clock;
use crate::store::CirculationStore;
use crate::types::{BookStatus, Reservation, ReservationStatus};
use crate::{Error, Result};
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

/// Owner of reservation status transitions
#[derive(Clone)]
pub struct ReservationQueue {
    store: Arc<dyn CirculationStore>,
    clock: Arc<dyn Clock>,
    hold_days: i64,
}

impl ReservationQueue {
    /// Create a queue over the given store
    ///
    /// `hold_days` is how long a pending reservation is held before it
    /// expires (the original system uses 7).
    pub fn new(store: Arc<dyn CirculationStore>, clock: Arc<dyn Clock>, hold_days: i64) -> Self {
        Self { store, clock, hold_days }
    }

    /// Join the waitlist for a book with no available copy
    pub fn create(&self, book_id: Uuid, user_id: Uuid) -> Result<Reservation> {
        let book = self
            .store
            .find_book(book_id)?
            .ok_or_else(|| Error::NotFound(format!("book {}", book_id)))?;
        self.store
            .find_member(user_id)?
            .ok_or_else(|| Error::NotFound(format!("member {}", user_id)))?;

        if book.status != BookStatus::Unavailable {
            return Err(Error::InvalidState(format!(
                "book {} is {:?}; reservations are only accepted while Unavailable",
                book_id, book.status
            )));
        }

        if self.store.pending_reservation_exists(user_id, book_id)? {
            return Err(Error::Conflict(format!(
                "member {} already has a pending reservation for book {}",
                user_id, book_id
            )));
        }

        let now = self.clock.now();
        let reservation = Reservation {
            reservation_id: Uuid::new_v4(),
            book_id,
            user_id,
            reservation_date: now,
            expiration_date: now + Duration::days(self.hold_days),
            fulfillment_date: None,
            status: ReservationStatus::Pending,
        };
        self.store.save_reservation(&reservation)?;

        tracing::info!(
            reservation_id = %reservation.reservation_id,
            book_id = %book_id,
            user_id = %user_id,
            expires = %reservation.expiration_date,
            "reservation created"
        );

        Ok(reservation)
    }

    /// Cancel a pending reservation; only the owner may do so
    pub fn cancel(&self, reservation_id: Uuid, requesting_user: Uuid) -> Result<Reservation> {
        let mut reservation = self.load(reservation_id)?;

        if reservation.user_id != requesting_user {
            return Err(Error::Unauthorized(format!(
                "member {} does not own reservation {}",
                requesting_user, reservation_id
            )));
        }

        if reservation.status != ReservationStatus::Pending {
            return Err(Error::InvalidState(format!(
                "reservation {} is {:?}; only pending reservations can be cancelled",
                reservation_id, reservation.status
            )));
        }

        reservation.status = ReservationStatus::Cancelled;
        self.store.save_reservation(&reservation)?;

        tracing::info!(reservation_id = %reservation_id, "reservation cancelled");

        Ok(reservation)
    }

    /// Convert a pending reservation into an actionable loan
    ///
    /// Requires the book to be `Available` and the reservation unexpired. An
    /// expired reservation is downgraded to `Cancelled` as part of the same
    /// call and the operation fails `Expired`.
    pub fn fulfill(&self, reservation_id: Uuid) -> Result<Reservation> {
        let mut reservation = self.load(reservation_id)?;

        if reservation.status != ReservationStatus::Pending {
            return Err(Error::InvalidState(format!(
                "reservation {} is {:?}, expected Pending",
                reservation_id, reservation.status
            )));
        }

        let book = self
            .store
            .find_book(reservation.book_id)?
            .ok_or_else(|| Error::NotFound(format!("book {}", reservation.book_id)))?;
        if book.status != BookStatus::Available {
            return Err(Error::InvalidState(format!(
                "book {} is {:?}; reservations are fulfilled only while Available",
                book.book_id, book.status
            )));
        }

        let now = self.clock.now();
        if reservation.is_expired(now) {
            reservation.status = ReservationStatus::Cancelled;
            self.store.save_reservation(&reservation)?;
            tracing::info!(reservation_id = %reservation_id, "expired reservation cancelled on fulfillment attempt");
            return Err(Error::Expired(format!(
                "reservation {} expired at {}",
                reservation_id, reservation.expiration_date
            )));
        }

        reservation.status = ReservationStatus::Fulfilled;
        reservation.fulfillment_date = Some(now);
        self.store.save_reservation(&reservation)?;

        tracing::info!(reservation_id = %reservation_id, book_id = %reservation.book_id, "reservation fulfilled");

        Ok(reservation)
    }

    /// Earliest-dated pending, unexpired reservation for a book, if any
    ///
    /// Invoked after a copy is released. Whether to actually fulfill is the
    /// admin flow's call; this only guarantees the candidate is the
    /// fairness-correct one.
    pub fn check_fulfillment_candidates(&self, book_id: Uuid) -> Result<Option<Reservation>> {
        let now = self.clock.now();
        let candidate = self
            .store
            .reservations_by_book(book_id)?
            .into_iter()
            .find(|r| r.status == ReservationStatus::Pending && !r.is_expired(now));

        if let Some(ref reservation) = candidate {
            tracing::debug!(
                book_id = %book_id,
                reservation_id = %reservation.reservation_id,
                reserved_at = %reservation.reservation_date,
                "fulfillment candidate found"
            );
        }

        Ok(candidate)
    }

    fn load(&self, reservation_id: Uuid) -> Result<Reservation> {
        self.store
            .find_reservation(reservation_id)?
            .ok_or_else(|| Error::NotFound(format!("reservation {}", reservation_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{BookStore, MemberStore, MemoryStore, ReservationStore};
    use crate::types::{Book, Member};
    use chrono::Utc;

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        queue: ReservationQueue,
        book_id: Uuid,
        user_id: Uuid,
    }

    fn setup(status: BookStatus) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let mut book = Book::new(
            "The Dispossessed",
            "Ursula K. Le Guin",
            "9780060512750",
            1,
            status,
            clock.now(),
        );
        if status == BookStatus::Unavailable {
            book.available_copies = 0;
        }
        store.save_book(&book).unwrap();

        let member = Member::new("Shevek");
        store.save_member(&member).unwrap();

        let queue = ReservationQueue::new(store.clone(), clock.clone(), 7);
        Fixture {
            store,
            clock,
            queue,
            book_id: book.book_id,
            user_id: member.member_id,
        }
    }

    fn add_member(fx: &Fixture, name: &str) -> Uuid {
        let member = Member::new(name);
        fx.store.save_member(&member).unwrap();
        member.member_id
    }

    fn set_book_status(fx: &Fixture, status: BookStatus) {
        let mut book = fx.store.find_book(fx.book_id).unwrap().unwrap();
        book.status = status;
        fx.store.save_book(&book).unwrap();
    }

    #[test]
    fn test_create_sets_seven_day_hold() {
        let fx = setup(BookStatus::Unavailable);

        let reservation = fx.queue.create(fx.book_id, fx.user_id).unwrap();
        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(reservation.reservation_date, fx.clock.now());
        assert_eq!(
            reservation.expiration_date,
            reservation.reservation_date + Duration::days(7)
        );
    }

    #[test]
    fn test_create_rejected_unless_unavailable() {
        let fx = setup(BookStatus::Available);
        let err = fx.queue.create(fx.book_id, fx.user_id).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        let fx = setup(BookStatus::Maintenance);
        let err = fx.queue.create(fx.book_id, fx.user_id).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_duplicate_pending_reservation_conflicts() {
        let fx = setup(BookStatus::Unavailable);

        fx.queue.create(fx.book_id, fx.user_id).unwrap();
        let err = fx.queue.create(fx.book_id, fx.user_id).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // A different member can still queue up
        let other = add_member(&fx, "Takver");
        fx.queue.create(fx.book_id, other).unwrap();
    }

    #[test]
    fn test_cancel_requires_owner_and_pending() {
        let fx = setup(BookStatus::Unavailable);
        let reservation = fx.queue.create(fx.book_id, fx.user_id).unwrap();

        let stranger = add_member(&fx, "Sabul");
        let err = fx
            .queue
            .cancel(reservation.reservation_id, stranger)
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        let cancelled = fx
            .queue
            .cancel(reservation.reservation_id, fx.user_id)
            .unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);

        // Cancelling twice is illegal
        let err = fx
            .queue
            .cancel(reservation.reservation_id, fx.user_id)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_fulfill_requires_available_book() {
        let fx = setup(BookStatus::Unavailable);
        let reservation = fx.queue.create(fx.book_id, fx.user_id).unwrap();

        let err = fx.queue.fulfill(reservation.reservation_id).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        set_book_status(&fx, BookStatus::Available);
        let fulfilled = fx.queue.fulfill(reservation.reservation_id).unwrap();
        assert_eq!(fulfilled.status, ReservationStatus::Fulfilled);
        assert_eq!(fulfilled.fulfillment_date, Some(fx.clock.now()));
    }

    #[test]
    fn test_fulfill_expired_downgrades_to_cancelled() {
        let fx = setup(BookStatus::Unavailable);
        let reservation = fx.queue.create(fx.book_id, fx.user_id).unwrap();

        set_book_status(&fx, BookStatus::Available);
        fx.clock.advance(Duration::days(7) + Duration::seconds(1));

        let err = fx.queue.fulfill(reservation.reservation_id).unwrap_err();
        assert!(matches!(err, Error::Expired(_)));

        let stored = fx
            .store
            .find_reservation(reservation.reservation_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ReservationStatus::Cancelled);
    }

    #[test]
    fn test_candidate_is_earliest_unexpired_pending() {
        let fx = setup(BookStatus::Unavailable);

        let first_user = fx.user_id;
        let second_user = add_member(&fx, "Takver");
        let third_user = add_member(&fx, "Bedap");

        let first = fx.queue.create(fx.book_id, first_user).unwrap();
        fx.clock.advance(Duration::hours(1));
        let second = fx.queue.create(fx.book_id, second_user).unwrap();
        fx.clock.advance(Duration::hours(1));
        let third = fx.queue.create(fx.book_id, third_user).unwrap();

        let candidate = fx.queue.check_fulfillment_candidates(fx.book_id).unwrap().unwrap();
        assert_eq!(candidate.reservation_id, first.reservation_id);

        // Cancel the head of the queue: second in line becomes the candidate
        fx.queue.cancel(first.reservation_id, first_user).unwrap();
        let candidate = fx.queue.check_fulfillment_candidates(fx.book_id).unwrap().unwrap();
        assert_eq!(candidate.reservation_id, second.reservation_id);

        // Push the clock past the second's window but inside the third's
        fx.clock.set(second.expiration_date + Duration::minutes(30));

        let candidate = fx.queue.check_fulfillment_candidates(fx.book_id).unwrap().unwrap();
        assert_eq!(candidate.reservation_id, third.reservation_id);
    }

    #[test]
    fn test_candidate_none_for_empty_queue() {
        let fx = setup(BookStatus::Unavailable);
        assert!(fx.queue.check_fulfillment_candidates(fx.book_id).unwrap().is_none());
    }
}
