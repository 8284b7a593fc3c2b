//! Scheduler Demo
//!
//! Walks through the core booking flows against an in-memory store:
//! - A: a 1:1 slot is booked at a requested time and type
//! - B: a second booker of the same slot gets a conflict
//! - C: two callers race for the last seat of a group slot
//! - D: an owner tries to book their own slot
//! - E: the participant cancels, once with a healthy mirror and once with a
//!   mirror that fails
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin demo
//! ```

use chrono::{DateTime, Duration, Utc};
use dojo_scheduler_core::cohort::SessionType;
use dojo_scheduler_core::command::BookRequest;
use dojo_scheduler_core::draft::SlotDraft;
use dojo_scheduler_core::eligibility::ListCriteria;
use dojo_scheduler_core::slot::{Slot, SlotKind};
use dojo_scheduler_runtime::SchedulingEngine;
use dojo_scheduler_service::{Config, LoggingNotifier, SchedulerApp, StoreBackend};
use dojo_scheduler_testing::{InMemoryLegacyMirror, InMemorySlotStore, StaticUserDirectory, member};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const COHORT: &str = "1500-1600";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dojo_scheduler=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("\n♟️  ============================================");
    println!("   Dojo Scheduler - Booking Walkthrough");
    println!("============================================\n");

    let mut config = Config::from_env()?;
    config.scheduler.store = StoreBackend::Memory;
    let users = directory();
    let app = SchedulerApp::new(config, users.clone()).await?;
    let engine = app.engine();

    // Tomorrow, 10:00-11:00 UTC
    let day = (Utc::now() + Duration::days(1)).date_naive();
    let start = day.and_hms_opt(10, 0, 0).ok_or("invalid start")?.and_utc();
    let end = start + Duration::hours(1);

    // ========== Scenario A ==========
    println!("1️⃣  Owner posts a 1:1 slot; alice books it for 10:30");
    let slot = engine
        .create_or_update(draft("owner", start, end, 1), "owner")
        .await?;
    let booked = engine
        .book(
            slot.id.as_str(),
            "alice",
            BookRequest {
                requested_time: Some(start + Duration::minutes(30)),
                requested_type: Some(SessionType::ClassicalGame),
            },
        )
        .await?;
    describe(&booked);

    // ========== Scenario B ==========
    println!("\n2️⃣  bob tries to book the same slot");
    match engine.book(slot.id.as_str(), "bob", BookRequest::default()).await {
        Ok(_) => println!("   ✗ unexpected second booking"),
        Err(e) => println!("   ✓ refused: {e}"),
    }

    // ========== Scenario C ==========
    println!("\n3️⃣  Group slot of 5 with 4 seats taken; carol and dave race for the last one");
    let group = engine
        .create_or_update(draft("owner", start, end, 5), "owner")
        .await?;
    for name in ["p1", "p2", "p3", "p4"] {
        engine.book(group.id.as_str(), name, BookRequest::default()).await?;
    }
    let (carol, dave) = tokio::join!(
        race(engine, group.id.as_str(), "carol"),
        race(engine, group.id.as_str(), "dave"),
    );
    for (name, won) in [("carol", carol), ("dave", dave)] {
        println!("   {name}: {}", if won { "got the seat" } else { "conflict" });
    }
    let stored = engine.get(group.id.as_str()).await?;
    describe(&stored);
    let listed = engine.list(ListCriteria::bookable(), "erin", None).await?;
    let still_listed = listed.slots.iter().any(|s| s.id == group.id);
    println!("   listed as bookable for erin: {still_listed}");

    // ========== Scenario D ==========
    println!("\n4️⃣  Owner tries to book their own slot");
    let own = engine
        .create_or_update(
            draft("owner", start + Duration::hours(2), end + Duration::hours(2), 1),
            "owner",
        )
        .await?;
    match engine.book(own.id.as_str(), "owner", BookRequest::default()).await {
        Ok(_) => println!("   ✗ unexpected self-booking"),
        Err(e) => println!("   ✓ refused: {e}"),
    }

    // ========== Scenario E ==========
    println!("\n5️⃣  alice cancels her 1:1 booking");
    let canceled = engine.cancel(slot.id.as_str(), "alice").await?;
    describe(&canceled);

    println!("\n    ...and again on a store whose legacy mirror is down");
    let degraded = SchedulingEngine::builder()
        .store(InMemorySlotStore::new())
        .users(users)
        .mirror(InMemoryLegacyMirror::failing())
        .notifications(LoggingNotifier)
        .build()?;
    let slot = degraded
        .create_or_update(draft("owner", start, end, 1), "owner")
        .await?;
    degraded.book(slot.id.as_str(), "alice", BookRequest::default()).await?;
    let canceled = degraded.cancel(slot.id.as_str(), "alice").await?;
    println!("   ✓ cancellation still succeeded (mirror failure was logged)");
    describe(&canceled);

    let health = engine.health_check().await;
    println!("\n🩺 Store health: {}", health.status);
    println!("\n✓ Demo complete\n");
    Ok(())
}

fn directory() -> StaticUserDirectory {
    StaticUserDirectory::with_users(
        ["owner", "alice", "bob", "carol", "dave", "erin", "p1", "p2", "p3", "p4"]
            .into_iter()
            .map(|name| member(name, COHORT)),
    )
}

fn draft(owner: &str, start: DateTime<Utc>, end: DateTime<Utc>, seats: u32) -> SlotDraft {
    SlotDraft {
        kind: Some(SlotKind::Availability),
        owner: owner.to_string(),
        owner_display_name: owner.to_string(),
        start_time: start.to_rfc3339(),
        end_time: end.to_rfc3339(),
        cohorts: vec![COHORT.to_string()],
        types: vec![SessionType::ClassicalGame.as_str().to_string()],
        max_participants: Some(seats),
        ..SlotDraft::default()
    }
}

async fn race(engine: &SchedulingEngine, id: &str, caller: &str) -> bool {
    engine.book(id, caller, BookRequest::default()).await.is_ok()
}

fn describe(slot: &Slot) {
    println!(
        "   slot {}: status={}, participants={}/{}, booked_start={}",
        slot.id,
        slot.status.as_str(),
        slot.participant_count(),
        slot.max_participants,
        slot.booked_start_time
            .map_or_else(|| "-".to_string(), |t| t.to_rfc3339()),
    );
}
