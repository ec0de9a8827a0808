//! Inventory ledger: the only component that mutates copy counters
//!
//! `available_copies` moves only through [`InventoryLedger::reserve_copy`]
//! and [`InventoryLedger::release_copy`]; `total_copies` only through
//! [`InventoryLedger::adjust_capacity`]. Callers are expected to hold the
//! book's coordinator lock, which makes each read-modify-write atomic with
//! respect to other operations on the same book.

use crate::clock::Clock;
use crate::store::CirculationStore;
use crate::types::Book;
use crate::{Error, Result};
use std::sync::Arc;
use uuid::Uuid;

/// Owner of a book's copy counters
#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn CirculationStore>,
    clock: Arc<dyn Clock>,
}

impl InventoryLedger {
    /// Create a ledger over the given store
    pub fn new(store: Arc<dyn CirculationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Take one copy off the shelf for a loan
    ///
    /// Fails `OutOfStock` when no copy is available; the book is unchanged.
    pub fn reserve_copy(&self, book_id: Uuid) -> Result<Book> {
        let mut book = self.load(book_id)?;

        if book.available_copies == 0 {
            return Err(Error::OutOfStock(format!(
                "no available copies of book {}",
                book_id
            )));
        }

        book.available_copies -= 1;
        book.updated_at = self.clock.now();
        self.store.save_book(&book)?;

        tracing::debug!(
            book_id = %book_id,
            available = book.available_copies,
            total = book.total_copies,
            "reserved copy"
        );

        Ok(book)
    }

    /// Put a returned copy back on the shelf
    ///
    /// Fails `InvalidState` if the book is already at capacity. Unreachable
    /// when every release is paired with a prior reserve.
    pub fn release_copy(&self, book_id: Uuid) -> Result<Book> {
        let mut book = self.load(book_id)?;

        if book.available_copies >= book.total_copies {
            return Err(Error::InvalidState(format!(
                "book {} already has all {} copies on the shelf",
                book_id, book.total_copies
            )));
        }

        book.available_copies += 1;
        book.updated_at = self.clock.now();
        self.store.save_book(&book)?;

        tracing::debug!(
            book_id = %book_id,
            available = book.available_copies,
            total = book.total_copies,
            "released copy"
        );

        Ok(book)
    }

    /// Change the number of copies the library owns
    ///
    /// Shifts `total_copies` and `available_copies` together, so copies out
    /// on loan are unaffected. Fails `InvalidArgument` when either counter
    /// would leave the representable range.
    pub fn adjust_capacity(&self, book_id: Uuid, delta: i64) -> Result<Book> {
        let mut book = self.load(book_id)?;

        let out_of_range = || {
            Error::InvalidArgument(format!(
                "capacity adjustment {} out of range for book {}",
                delta, book_id
            ))
        };
        let new_total = i64::from(book.total_copies)
            .checked_add(delta)
            .ok_or_else(out_of_range)?;
        let new_available = i64::from(book.available_copies)
            .checked_add(delta)
            .ok_or_else(out_of_range)?;

        if new_total < 0 {
            return Err(Error::InvalidArgument(format!(
                "capacity adjustment {} would leave book {} with {} total copies",
                delta, book_id, new_total
            )));
        }
        if new_available < 0 {
            return Err(Error::InvalidArgument(format!(
                "capacity adjustment {} would leave book {} with {} available copies",
                delta, book_id, new_available
            )));
        }

        book.total_copies = u32::try_from(new_total).map_err(|_| out_of_range())?;
        book.available_copies = u32::try_from(new_available).map_err(|_| out_of_range())?;
        book.updated_at = self.clock.now();
        self.store.save_book(&book)?;

        tracing::info!(
            book_id = %book_id,
            delta,
            total = book.total_copies,
            available = book.available_copies,
            "adjusted capacity"
        );

        Ok(book)
    }

    fn load(&self, book_id: Uuid) -> Result<Book> {
        self.store
            .find_book(book_id)?
            .ok_or_else(|| Error::NotFound(format!("book {}", book_id)))
    }
}
