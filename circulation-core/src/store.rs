//! Storage collaborator for the circulation engine
//!
//! The engine does not prescribe a database; it talks to a set of narrow
//! repository traits (find-by-id / find-by-book / find-by-user / save) and
//! surfaces any storage failure unmodified as [`Error::Storage`]. The bundled
//! [`MemoryStore`] backs tests and the demo orchestrator.

use crate::types::{Book, BorrowRecord, BorrowStatus, Member, Reservation, ReservationStatus};
use crate::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Repository reads/writes for books
pub trait BookStore {
    /// Find a book by ID
    fn find_book(&self, book_id: Uuid) -> Result<Option<Book>>;

    /// Persist a book (insert or replace)
    fn save_book(&self, book: &Book) -> Result<()>;
}

/// Repository reads for members
pub trait MemberStore {
    /// Find a member by ID
    fn find_member(&self, member_id: Uuid) -> Result<Option<Member>>;

    /// Persist a member (insert or replace)
    fn save_member(&self, member: &Member) -> Result<()>;
}

/// Repository reads/writes for borrow records
pub trait BorrowStore {
    /// Find a borrow record by ID
    fn find_borrow(&self, record_id: Uuid) -> Result<Option<BorrowRecord>>;

    /// Persist a borrow record (insert or replace)
    fn save_borrow(&self, record: &BorrowRecord) -> Result<()>;

    /// All borrow records for a book
    fn borrows_by_book(&self, book_id: Uuid) -> Result<Vec<BorrowRecord>>;

    /// All borrow records for a member
    fn borrows_by_user(&self, user_id: Uuid) -> Result<Vec<BorrowRecord>>;

    /// Borrowed records whose due date has passed
    fn overdue_borrows(&self, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<BorrowRecord>>;
}

/// Repository reads/writes for reservations
pub trait ReservationStore {
    /// Find a reservation by ID
    fn find_reservation(&self, reservation_id: Uuid) -> Result<Option<Reservation>>;

    /// Persist a reservation (insert or replace)
    fn save_reservation(&self, reservation: &Reservation) -> Result<()>;

    /// Reservations for a book, ordered by reservation date ascending
    fn reservations_by_book(&self, book_id: Uuid) -> Result<Vec<Reservation>>;

    /// All reservations for a member
    fn reservations_by_user(&self, user_id: Uuid) -> Result<Vec<Reservation>>;

    /// Whether the member already has a pending reservation for the book
    fn pending_reservation_exists(&self, user_id: Uuid, book_id: Uuid) -> Result<bool>;

    /// All pending reservations across all books (sweeper input)
    fn pending_reservations(&self) -> Result<Vec<Reservation>>;
}

/// The full storage surface the engine depends on
pub trait CirculationStore:
    BookStore + MemberStore + BorrowStore + ReservationStore + Send + Sync
{
}

impl<T> CirculationStore for T where
    T: BookStore + MemberStore + BorrowStore + ReservationStore + Send + Sync
{
}

/// In-memory store for tests and demos
///
/// Writes through `parking_lot` locks; individual saves cannot fail, so each
/// engine operation's writes are effectively atomic once the per-book
/// coordinator lock is held. A durable adapter should scope the same writes
/// in one transaction.
#[derive(Debug, Default)]
pub struct MemoryStore {
    books: RwLock<HashMap<Uuid, Book>>,
    members: RwLock<HashMap<Uuid, Member>>,
    borrows: RwLock<HashMap<Uuid, BorrowRecord>>,
    reservations: RwLock<HashMap<Uuid, Reservation>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Count records currently on loan for a book
    ///
    /// Used by invariant checks: `available_copies` must always equal
    /// `total_copies` minus this count.
    pub fn borrowed_count(&self, book_id: Uuid) -> usize {
        self.borrows
            .read()
            .values()
            .filter(|r| r.book_id == book_id && r.status == BorrowStatus::Borrowed)
            .count()
    }
}

impl BookStore for MemoryStore {
    fn find_book(&self, book_id: Uuid) -> Result<Option<Book>> {
        Ok(self.books.read().get(&book_id).cloned())
    }

    fn save_book(&self, book: &Book) -> Result<()> {
        self.books.write().insert(book.book_id, book.clone());
        Ok(())
    }
}

impl MemberStore for MemoryStore {
    fn find_member(&self, member_id: Uuid) -> Result<Option<Member>> {
        Ok(self.members.read().get(&member_id).cloned())
    }

    fn save_member(&self, member: &Member) -> Result<()> {
        self.members.write().insert(member.member_id, member.clone());
        Ok(())
    }
}

impl BorrowStore for MemoryStore {
    fn find_borrow(&self, record_id: Uuid) -> Result<Option<BorrowRecord>> {
        Ok(self.borrows.read().get(&record_id).cloned())
    }

    fn save_borrow(&self, record: &BorrowRecord) -> Result<()> {
        self.borrows.write().insert(record.record_id, record.clone());
        Ok(())
    }

    fn borrows_by_book(&self, book_id: Uuid) -> Result<Vec<BorrowRecord>> {
        Ok(self
            .borrows
            .read()
            .values()
            .filter(|r| r.book_id == book_id)
            .cloned()
            .collect())
    }

    fn borrows_by_user(&self, user_id: Uuid) -> Result<Vec<BorrowRecord>> {
        Ok(self
            .borrows
            .read()
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    fn overdue_borrows(&self, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<BorrowRecord>> {
        Ok(self
            .borrows
            .read()
            .values()
            .filter(|r| r.status == BorrowStatus::Borrowed && r.due_date < now)
            .cloned()
            .collect())
    }
}

impl ReservationStore for MemoryStore {
    fn find_reservation(&self, reservation_id: Uuid) -> Result<Option<Reservation>> {
        Ok(self.reservations.read().get(&reservation_id).cloned())
    }

    fn save_reservation(&self, reservation: &Reservation) -> Result<()> {
        self.reservations
            .write()
            .insert(reservation.reservation_id, reservation.clone());
        Ok(())
    }

    fn reservations_by_book(&self, book_id: Uuid) -> Result<Vec<Reservation>> {
        let mut reservations: Vec<Reservation> = self
            .reservations
            .read()
            .values()
            .filter(|r| r.book_id == book_id)
            .cloned()
            .collect();
        reservations.sort_by_key(|r| r.reservation_date);
        Ok(reservations)
    }

    fn reservations_by_user(&self, user_id: Uuid) -> Result<Vec<Reservation>> {
        Ok(self
            .reservations
            .read()
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    fn pending_reservation_exists(&self, user_id: Uuid, book_id: Uuid) -> Result<bool> {
        Ok(self.reservations.read().values().any(|r| {
            r.user_id == user_id && r.book_id == book_id && r.status == ReservationStatus::Pending
        }))
    }

    fn pending_reservations(&self) -> Result<Vec<Reservation>> {
        Ok(self
            .reservations
            .read()
            .values()
            .filter(|r| r.status == ReservationStatus::Pending)
            .cloned()
            .collect())
    }
}
