// Demo Orchestrator - drives the circulation engine through a realistic day
// at the library: a contended approval, a waitlist, and an expiration sweep.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use circulation_core::{
    Book, BookStatus, BookStore, CirculationEngine, Clock, Config, Error, ManualClock, Member,
    MemberStore, MemoryStore, StaticIdentity,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

struct DemoLibrary {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    engine: Arc<CirculationEngine>,
}

impl DemoLibrary {
    fn new() -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let librarian = Member::new("head librarian");
        store.save_member(&librarian)?;

        let engine = Arc::new(CirculationEngine::new(
            store.clone(),
            clock.clone(),
            Arc::new(StaticIdentity(librarian.member_id)),
            Config::default(),
        ));

        Ok(Self { store, clock, engine })
    }

    fn seed_book(&self, title: &str, author: &str, isbn: &str, copies: u32) -> Result<Uuid> {
        let book = Book::new(title, author, isbn, copies, BookStatus::Available, self.clock.now());
        self.store.save_book(&book)?;
        info!(title, copies, "book added to catalog");
        Ok(book.book_id)
    }

    fn seed_member(&self, name: &str) -> Result<Uuid> {
        let member = Member::new(name);
        self.store.save_member(&member)?;
        Ok(member.member_id)
    }

    fn mark_unavailable(&self, book_id: Uuid) -> Result<()> {
        let mut book = self
            .store
            .find_book(book_id)?
            .ok_or_else(|| anyhow::anyhow!("seeded book missing from store"))?;
        book.status = BookStatus::Unavailable;
        self.store.save_book(&book)?;
        Ok(())
    }

    /// Three members race for the two copies of a popular title
    async fn contention_scene(&self) -> Result<()> {
        info!("--- scene 1: three approvals, two copies ---");

        let book_id = self.seed_book("Project Hail Mary", "Andy Weir", "9780593135204", 2)?;
        let due = self.clock.now() + ChronoDuration::days(14);

        let mut record_ids = Vec::new();
        for name in ["Ryland", "Eva", "Rocky"] {
            let user_id = self.seed_member(name)?;
            let record = self
                .engine
                .create_borrow_request(user_id, book_id, due)
                .await?;
            record_ids.push((name, record.record_id));
        }

        let mut handles = Vec::new();
        for (name, record_id) in record_ids {
            let engine = self.engine.clone();
            handles.push(tokio::spawn(async move {
                (name, engine.approve_borrow(record_id).await)
            }));
        }

        for handle in handles {
            let (name, outcome) = handle.await?;
            match outcome {
                Ok(record) => info!(member = name, status = ?record.status, "approval succeeded"),
                Err(Error::OutOfStock(_)) => {
                    info!(member = name, "approval failed, no copies left; request stays pending")
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// A waitlist forms, a copy comes back, and the queue is served in order
    async fn waitlist_scene(&self) -> Result<()> {
        info!("--- scene 2: reservation waitlist ---");

        let book_id = self.seed_book("Piranesi", "Susanna Clarke", "9781635575637", 1)?;
        let reader = self.seed_member("Matthew")?;

        let record = self
            .engine
            .create_borrow_request(reader, book_id, self.clock.now() + ChronoDuration::days(14))
            .await?;
        self.engine.approve_borrow(record.record_id).await?;
        self.mark_unavailable(book_id)?;

        for name in ["Sixteen", "Ketterley"] {
            let user_id = self.seed_member(name)?;
            let reservation = self.engine.create_reservation(book_id, user_id).await?;
            info!(
                member = name,
                expires = %reservation.expiration_date,
                "joined the waitlist"
            );
        }

        self.clock.advance(ChronoDuration::days(3));
        self.engine.return_book(record.record_id).await?;

        if let Some(candidate) = self.engine.fulfillment_candidate(book_id).await? {
            info!(
                reservation_id = %candidate.reservation_id,
                reserved_at = %candidate.reservation_date,
                "next in line"
            );
        }

        Ok(())
    }

    /// Stale reservations are retired by the sweep, exactly once
    async fn sweep_scene(&self) -> Result<()> {
        info!("--- scene 3: expiration sweep ---");

        let book_id = self.seed_book("The Hobbit", "J. R. R. Tolkien", "9780547928227", 1)?;
        self.mark_unavailable(book_id)?;

        for name in ["Bilbo", "Thorin", "Balin"] {
            let user_id = self.seed_member(name)?;
            self.engine.create_reservation(book_id, user_id).await?;
        }

        self.clock.advance(ChronoDuration::days(8));

        let report = self.engine.sweep_expired_reservations().await?;
        info!(scanned = report.scanned, cancelled = report.cancelled, "first sweep");

        let report = self.engine.sweep_expired_reservations().await?;
        info!(scanned = report.scanned, cancelled = report.cancelled, "second sweep (idempotent)");

        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("circulation engine demo starting");

    let library = DemoLibrary::new()?;
    library.contention_scene().await?;
    library.waitlist_scene().await?;
    library.sweep_scene().await?;

    info!("demo complete");
    Ok(())
}
