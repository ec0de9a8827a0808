//! Core types for the circulation engine
//!
//! All entities carry plain data and serialize with serde; lifecycle rules
//! live in the component modules, not here. The only logic on these types is
//! status classification (terminal states, expiry checks).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A book in the catalog, as seen by the circulation engine
///
/// Bibliographic fields are owned by the catalog service; the engine only
/// mutates the copy counters (and never outside [`crate::InventoryLedger`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Unique book ID
    pub book_id: Uuid,

    /// Title
    pub title: String,

    /// Author
    pub author: String,

    /// ISBN (unique in the catalog)
    pub isbn: String,

    /// Physical copies owned by the library
    pub total_copies: u32,

    /// Copies currently not on loan (always <= total_copies)
    pub available_copies: u32,

    /// Lending status
    pub status: BookStatus,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Create a new book with all copies available
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        isbn: impl Into<String>,
        total_copies: u32,
        status: BookStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            book_id: Uuid::new_v4(),
            title: title.into(),
            author: author.into(),
            isbn: isbn.into(),
            total_copies,
            available_copies: total_copies,
            status,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lending status of a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookStatus {
    /// At least notionally lendable; reservations are rejected
    Available,
    /// No copy currently lendable; reservations are accepted
    Unavailable,
    /// Pulled from circulation entirely
    Maintenance,
}

/// A library member, as far as the engine needs to know one
///
/// Account management is external; this record exists so absent members
/// surface as `NotFound` instead of dangling references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Unique member ID
    pub member_id: Uuid,

    /// Display name
    pub name: String,
}

impl Member {
    /// Create a new member
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            member_id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// One lending request, tracked from request to return
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowRecord {
    /// Unique record ID
    pub record_id: Uuid,

    /// Book being borrowed
    pub book_id: Uuid,

    /// Requesting member
    pub user_id: Uuid,

    /// When the request was made
    pub borrow_date: DateTime<Utc>,

    /// When the copy is due back
    pub due_date: DateTime<Utc>,

    /// When the copy came back (null until returned)
    pub return_date: Option<DateTime<Utc>>,

    /// Reason given on rejection (null otherwise)
    pub rejection_reason: Option<String>,

    /// Current lifecycle status
    pub status: BorrowStatus,
}

impl BorrowRecord {
    /// Check if the record is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, BorrowStatus::Rejected | BorrowStatus::Returned)
    }
}

/// Borrow record lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BorrowStatus {
    /// Requested, awaiting librarian approval
    Pending,
    /// Approved; a copy is on loan
    Borrowed,
    /// Rejected by a librarian (terminal)
    Rejected,
    /// Copy returned (terminal)
    Returned,
}

/// A waitlist entry for a book with no available copy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique reservation ID
    pub reservation_id: Uuid,

    /// Book being waited on
    pub book_id: Uuid,

    /// Waiting member
    pub user_id: Uuid,

    /// Queue position is derived from this; immutable once set
    pub reservation_date: DateTime<Utc>,

    /// After this instant the reservation can no longer be fulfilled
    pub expiration_date: DateTime<Utc>,

    /// When the reservation was converted to a loan offer (null until then)
    pub fulfillment_date: Option<DateTime<Utc>>,

    /// Current status; monotonic, never returns to Pending
    pub status: ReservationStatus,
}

impl Reservation {
    /// Check if the reservation is past its expiration window
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date < now
    }
}

/// Reservation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Waiting in the queue
    Pending,
    /// Converted to an actionable loan (terminal)
    Fulfilled,
    /// Cancelled by the member or expired by the sweeper (terminal)
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_book_starts_fully_available() {
        let now = Utc::now();
        let book = Book::new("Dune", "Frank Herbert", "9780441172719", 3, BookStatus::Available, now);
        assert_eq!(book.total_copies, 3);
        assert_eq!(book.available_copies, 3);
        assert_eq!(book.created_at, book.updated_at);
    }

    #[test]
    fn test_borrow_record_terminal_states() {
        let now = Utc::now();
        let mut record = BorrowRecord {
            record_id: Uuid::new_v4(),
            book_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            borrow_date: now,
            due_date: now + Duration::days(14),
            return_date: None,
            rejection_reason: None,
            status: BorrowStatus::Pending,
        };

        assert!(!record.is_terminal());
        record.status = BorrowStatus::Borrowed;
        assert!(!record.is_terminal());
        record.status = BorrowStatus::Returned;
        assert!(record.is_terminal());
        record.status = BorrowStatus::Rejected;
        assert!(record.is_terminal());
    }

    #[test]
    fn test_reservation_expiry() {
        let now = Utc::now();
        let reservation = Reservation {
            reservation_id: Uuid::new_v4(),
            book_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            reservation_date: now,
            expiration_date: now + Duration::days(7),
            fulfillment_date: None,
            status: ReservationStatus::Pending,
        };

        assert!(!reservation.is_expired(now));
        assert!(!reservation.is_expired(now + Duration::days(7)));
        assert!(reservation.is_expired(now + Duration::days(7) + Duration::seconds(1)));
    }
}
