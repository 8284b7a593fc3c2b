//! Rendering of preconditions and patches into SQL.
//!
//! Every precondition becomes a boolean expression over one row of `slots`,
//! so the database evaluates it in the same statement that writes the row.

use dojo_scheduler_core::cohort::ALL_COHORTS;
use dojo_scheduler_core::store::{Precondition, SlotPatch};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

/// Columns read back into a [`SlotRow`](crate::slot_store::SlotRow).
pub(crate) const RETURNED_COLUMNS: &str =
    "id, body, status, participants, booked_start_time, booked_type, expiration_time";

/// Append `precondition` as a boolean expression over the row of `table`.
///
/// Only existing rows reach the expression, so [`Precondition::Absent`]
/// renders as `FALSE` and [`Precondition::Exists`] as `TRUE`.
pub(crate) fn push_precondition(
    qb: &mut QueryBuilder<'_, Postgres>,
    table: &str,
    precondition: &Precondition,
) {
    match precondition {
        Precondition::Exists => {
            qb.push("TRUE");
        }
        Precondition::Absent => {
            qb.push("FALSE");
        }
        Precondition::StatusIs(status) => {
            qb.push(format!("{table}.status = "));
            qb.push_bind(status.as_str());
        }
        Precondition::HasCapacity => {
            qb.push(format!(
                "(SELECT count(*) FROM jsonb_object_keys({table}.participants)) < {table}.max_participants"
            ));
        }
        Precondition::HasParticipant(username) => {
            qb.push(format!("{table}.participants ? "));
            qb.push_bind(username.clone());
        }
        Precondition::LacksParticipant(username) => {
            qb.push(format!("NOT ({table}.participants ? "));
            qb.push_bind(username.clone());
            qb.push(")");
        }
        Precondition::NoParticipants => {
            qb.push(format!("{table}.participants = '{{}}'::jsonb"));
        }
        Precondition::HasParticipants => {
            qb.push(format!("{table}.participants <> '{{}}'::jsonb"));
        }
        Precondition::OwnerIs(owner) => {
            qb.push(format!("{table}.owner = "));
            qb.push_bind(owner.clone());
        }
        Precondition::MaxParticipantsIs(max) => {
            qb.push(format!("{table}.max_participants = "));
            qb.push_bind(i64::from(*max));
        }
        Precondition::WindowIs { start, end } => {
            qb.push(format!("({table}.start_time = "));
            qb.push_bind(*start);
            qb.push(format!(" AND {table}.end_time = "));
            qb.push_bind(*end);
            qb.push(")");
        }
        Precondition::OffersType(t) => {
            qb.push(format!(
                "(jsonb_array_length(COALESCE({table}.body->'types', '[]'::jsonb)) = 0 \
                 OR {table}.body->'types' ? "
            ));
            qb.push_bind(t.as_str());
            qb.push(")");
        }
        Precondition::OffersCohort(cohort) => {
            qb.push(format!("({table}.body->'cohorts' ? "));
            qb.push_bind(cohort.as_str().to_string());
            qb.push(format!(" OR {table}.body->'cohorts' ? "));
            qb.push_bind(ALL_COHORTS);
            qb.push(")");
        }
        Precondition::All(clauses) => push_group(qb, table, clauses, " AND ", "TRUE"),
        Precondition::Any(clauses) => push_group(qb, table, clauses, " OR ", "FALSE"),
    }
}

fn push_group(
    qb: &mut QueryBuilder<'_, Postgres>,
    table: &str,
    clauses: &[Precondition],
    joiner: &str,
    empty: &str,
) {
    if clauses.is_empty() {
        qb.push(empty);
        return;
    }
    qb.push("(");
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            qb.push(joiner);
        }
        push_precondition(qb, table, clause);
    }
    qb.push(")");
}

/// Append the `SET` list for `patch`, always touching `updated_at`.
pub(crate) fn push_patch(qb: &mut QueryBuilder<'_, Postgres>, patch: &SlotPatch) {
    qb.push("updated_at = now()");
    if let Some(participant) = &patch.add_participant {
        qb.push(", participants = participants || jsonb_build_object(");
        qb.push_bind(participant.username.clone());
        qb.push("::text, ");
        qb.push_bind(Json(participant.clone()));
        qb.push("::jsonb)");
    }
    if let Some(status) = patch.status {
        qb.push(", status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(time) = patch.booked_start_time {
        qb.push(", booked_start_time = ");
        qb.push_bind(time);
    }
    if let Some(booked_type) = patch.booked_type {
        qb.push(", booked_type = ");
        qb.push_bind(booked_type.as_str());
    }
    if let Some(message) = &patch.add_message {
        qb.push(
            ", body = jsonb_set(body, '{messages}', \
             COALESCE(body->'messages', '[]'::jsonb) || jsonb_build_array(",
        );
        qb.push_bind(Json(message.clone()));
        qb.push("::jsonb))");
    }
}
