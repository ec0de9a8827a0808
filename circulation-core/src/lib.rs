//! Circulation & reservation consistency engine
//!
//! Guarantees a library never lends a book beyond its physical copy count,
//! that borrow/return transitions are legal, and that per-book reservation
//! waitlists are served fairly and expire correctly, even under concurrent
//! callers.
//!
//! # Architecture
//!
//! - **InventoryLedger**: sole owner of a book's copy counters
//! - **BorrowLifecycle**: state machine for a single borrow record
//! - **ReservationQueue**: per-book FIFO waitlist
//! - **ExpirationSweeper**: single-flight periodic retirement of stale reservations
//! - **BookCoordinator**: per-book serialization of every read-then-write
//! - **CirculationEngine**: facade the request layer consumes
//!
//! # Invariants
//!
//! - `available_copies = total_copies - |borrowed records|` per book, always
//! - At most one pending reservation per (member, book)
//! - Fulfillment never skips an earlier-dated pending reservation
//! - Failed operations leave every entity exactly as before the call

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod borrow;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod identity;
pub mod inventory;
pub mod reservation;
pub mod store;
pub mod sweeper;
pub mod types;

// Re-exports
pub use borrow::BorrowLifecycle;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use coordinator::BookCoordinator;
pub use engine::CirculationEngine;
pub use error::{Error, Result};
pub use identity::{AnonymousIdentity, Identity, StaticIdentity};
pub use inventory::InventoryLedger;
pub use reservation::ReservationQueue;
pub use store::{
    BookStore, BorrowStore, CirculationStore, MemberStore, MemoryStore, ReservationStore,
};
pub use sweeper::{ExpirationSweeper, SweepReport};
pub use types::{
    Book, BookStatus, BorrowRecord, BorrowStatus, Member, Reservation, ReservationStatus,
};
