//! `PostgreSQL` legacy mirror.

use crate::slot_store::database_error;
use dojo_scheduler_core::error::StoreError;
use dojo_scheduler_core::legacy::{AvailabilityRecord, LegacyMirror, MeetingRecord, missing_meeting};
use dojo_scheduler_core::slot::{Slot, SlotStatus};
use dojo_scheduler_core::store::StoreFuture;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

/// Writes the availability/meeting pair into the `availabilities` and
/// `meetings` tables created by [`PostgresSlotStore::migrate`](crate::PostgresSlotStore::migrate).
///
/// Both records of a booking are written in one transaction, but never in
/// the same transaction as the slot itself.
#[derive(Clone)]
pub struct PostgresLegacyMirror {
    pool: PgPool,
}

impl PostgresLegacyMirror {
    /// Create a mirror from an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Read back a mirrored availability.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query or decoding fails.
    pub async fn availability(&self, id: &str) -> Result<Option<AvailabilityRecord>, StoreError> {
        let row: Option<(Json<AvailabilityRecord>,)> =
            sqlx::query_as("SELECT record FROM availabilities WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;
        Ok(row.map(|(Json(record),)| record))
    }

    /// Read back a mirrored meeting.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query or decoding fails.
    pub async fn meeting(&self, id: &str) -> Result<Option<MeetingRecord>, StoreError> {
        let row: Option<(Json<MeetingRecord>,)> =
            sqlx::query_as("SELECT record FROM meetings WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;
        Ok(row.map(|(Json(record),)| record))
    }

    async fn book(&self, slot: &Slot) -> Result<(), StoreError> {
        let meeting = MeetingRecord::from_slot(slot).ok_or_else(|| missing_meeting(slot))?;
        let mut tx = self.pool.begin().await.map_err(database_error)?;
        upsert_meeting(&mut *tx, &meeting).await?;
        upsert_availability(&mut *tx, &AvailabilityRecord::from_slot(slot)).await?;
        tx.commit().await.map_err(database_error)?;
        tracing::debug!(slot_id = %slot.id, "Mirrored booking");
        Ok(())
    }

    async fn restore(&self, slot: &Slot) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;
        upsert_availability(&mut *tx, &AvailabilityRecord::reopened(slot)).await?;
        sqlx::query(
            "UPDATE meetings SET status = $2, record = jsonb_set(record, '{status}', to_jsonb($2::text)), \
             updated_at = now() WHERE id = $1",
        )
        .bind(slot.id.as_str())
        .bind(SlotStatus::Canceled.as_str())
        .execute(&mut *tx)
        .await
        .map_err(database_error)?;
        tx.commit().await.map_err(database_error)?;
        tracing::debug!(slot_id = %slot.id, "Restored availability");
        Ok(())
    }
}

async fn upsert_availability(
    conn: &mut PgConnection,
    record: &AvailabilityRecord,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO availabilities (id, owner, status, start_time, end_time, expiration_time, record) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (id) DO UPDATE SET owner = EXCLUDED.owner, status = EXCLUDED.status, \
         start_time = EXCLUDED.start_time, end_time = EXCLUDED.end_time, \
         expiration_time = EXCLUDED.expiration_time, record = EXCLUDED.record, updated_at = now()",
    )
    .bind(record.id.as_str())
    .bind(&record.owner)
    .bind(record.status.as_str())
    .bind(record.start_time)
    .bind(record.end_time)
    .bind(record.expiration_time)
    .bind(Json(record))
    .execute(conn)
    .await
    .map_err(database_error)?;
    Ok(())
}

async fn upsert_meeting(conn: &mut PgConnection, record: &MeetingRecord) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO meetings (id, owner, participant, status, start_time, expiration_time, record) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (id) DO UPDATE SET participant = EXCLUDED.participant, status = EXCLUDED.status, \
         start_time = EXCLUDED.start_time, expiration_time = EXCLUDED.expiration_time, \
         record = EXCLUDED.record, updated_at = now()",
    )
    .bind(record.id.as_str())
    .bind(&record.owner)
    .bind(&record.participant)
    .bind(record.status.as_str())
    .bind(record.start_time)
    .bind(record.expiration_time)
    .bind(Json(record))
    .execute(conn)
    .await
    .map_err(database_error)?;
    Ok(())
}

impl LegacyMirror for PostgresLegacyMirror {
    fn mirror_booking<'a>(&'a self, slot: &'a Slot) -> StoreFuture<'a, ()> {
        Box::pin(self.book(slot))
    }

    fn restore_availability<'a>(&'a self, slot: &'a Slot) -> StoreFuture<'a, ()> {
        Box::pin(self.restore(slot))
    }
}
