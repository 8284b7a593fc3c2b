//! The slot record and its identifiers.
//!
//! A slot (called an "event" by users) is the single schedulable entity: a 1:1
//! availability, a capacity-limited group session or a broadcast session. All
//! engine transitions read and write exactly one slot record.

use crate::cohort::{Cohort, SessionType};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Owner name used for admin-authored broadcast slots.
pub const BROADCAST_OWNER: &str = "Sensei";

/// Unique identifier for a slot.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(String);

impl SlotId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing id (e.g. a tournament id supplied by the caller).
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What kind of session a slot represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotKind {
    /// A sparring availability posted by a member (1:1 or group).
    Availability,
    /// A coaching session posted by a coach.
    Coaching,
    /// An admin-run broadcast session.
    Dojo,
    /// An admin-run league tournament, kept around longer than other slots.
    LigaTournament,
}

impl SlotKind {
    /// Wire name, e.g. `AVAILABILITY`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Availability => "AVAILABILITY",
            Self::Coaching => "COACHING",
            Self::Dojo => "DOJO",
            Self::LigaTournament => "LIGA_TOURNAMENT",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AVAILABILITY" => Some(Self::Availability),
            "COACHING" => Some(Self::Coaching),
            "DOJO" => Some(Self::Dojo),
            "LIGA_TOURNAMENT" => Some(Self::LigaTournament),
            _ => None,
        }
    }

    /// Broadcast kinds are authored by admins rather than by their owner.
    #[must_use]
    pub const fn is_broadcast(&self) -> bool {
        matches!(self, Self::Dojo | Self::LigaTournament)
    }

    /// Kinds whose 1:1 slots must offer at least one session type.
    #[must_use]
    pub const fn requires_types(&self) -> bool {
        matches!(self, Self::Availability)
    }

    /// Kinds that stay in the store for a week instead of two days.
    #[must_use]
    pub const fn is_long_lived(&self) -> bool {
        matches!(self, Self::LigaTournament)
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling status of a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    /// Open for booking (subject to capacity).
    Scheduled,
    /// A 1:1 slot whose single seat is taken.
    Booked,
    /// Terminal.
    Canceled,
}

impl SlotStatus {
    /// Wire name, e.g. `SCHEDULED`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Booked => "BOOKED",
            Self::Canceled => "CANCELED",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SCHEDULED" => Some(Self::Scheduled),
            "BOOKED" => Some(Self::Booked),
            "CANCELED" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Whether `self -> next` is a legal forward move of the state machine.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Booked | Self::Canceled) | (Self::Booked, Self::Canceled)
        )
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a participant taken when they booked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Username of the participant.
    pub username: String,
    /// Display name at booking time.
    pub display_name: String,
    /// Cohort at booking time.
    pub cohort: Cohort,
    /// Cohort the participant most recently graduated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_cohort: Option<Cohort>,
}

/// A note left on a slot by its owner or one of its participants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotMessage {
    /// Unique id of the message.
    pub id: String,
    /// Username of the author.
    pub owner: String,
    /// Author's display name when posting.
    pub owner_display_name: String,
    /// Author's cohort when posting.
    pub owner_cohort: Cohort,
    /// Cohort the author most recently graduated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_previous_cohort: Option<Cohort>,
    /// When the message was posted.
    pub created_at: DateTime<Utc>,
    /// Message text.
    pub content: String,
}

/// The unified schedulable record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    /// Unique id, assigned on first save.
    pub id: SlotId,
    /// Kind of session.
    #[serde(rename = "type")]
    pub kind: SlotKind,
    /// Username of the owner, or [`BROADCAST_OWNER`] for broadcast kinds.
    pub owner: String,
    /// Owner's display name.
    pub owner_display_name: String,
    /// Owner's cohort; `None` for broadcast kinds.
    #[serde(default)]
    pub owner_cohort: Option<Cohort>,
    /// Optional title (required for broadcast kinds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Earliest start.
    pub start_time: DateTime<Utc>,
    /// Latest start (or end, for broadcast sessions).
    pub end_time: DateTime<Utc>,
    /// Start time chosen by the booker of a 1:1 slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booked_start_time: Option<DateTime<Utc>>,
    /// When the store may garbage-collect the record. Server computed and never
    /// exposed to API consumers.
    #[serde(skip)]
    pub expiration_time: Option<DateTime<Utc>>,
    /// Session types the owner accepts.
    #[serde(default)]
    pub types: Vec<SessionType>,
    /// Session type chosen by the booker of a 1:1 slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booked_type: Option<SessionType>,
    /// Cohorts allowed to book.
    pub cohorts: Vec<Cohort>,
    /// Current status.
    pub status: SlotStatus,
    /// Where the session happens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Seat count, at least one.
    pub max_participants: u32,
    /// Participants keyed by username.
    #[serde(default)]
    pub participants: BTreeMap<String, Participant>,
    /// Messages from the owner and participants, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<SlotMessage>,
}

impl Slot {
    /// A 1:1 slot has exactly one seat and flips to Booked when it is taken.
    #[must_use]
    pub const fn is_one_on_one(&self) -> bool {
        self.max_participants == 1
    }

    /// Number of seats still open.
    #[must_use]
    pub fn remaining_seats(&self) -> u32 {
        self.max_participants.saturating_sub(self.participant_count())
    }

    /// Whether at least one seat is open.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.remaining_seats() > 0
    }

    /// Number of participants, saturating at `u32::MAX`.
    #[must_use]
    pub fn participant_count(&self) -> u32 {
        u32::try_from(self.participants.len()).unwrap_or(u32::MAX)
    }

    /// Whether `username` holds a seat.
    #[must_use]
    pub fn has_participant(&self, username: &str) -> bool {
        self.participants.contains_key(username)
    }

    /// Whether `username` owns the slot.
    #[must_use]
    pub fn is_owned_by(&self, username: &str) -> bool {
        self.owner == username
    }

    /// Whether the `[start, end]` window contains `time`.
    #[must_use]
    pub fn contains_time(&self, time: DateTime<Utc>) -> bool {
        self.start_time <= time && time <= self.end_time
    }

    /// The first session type offered, if any.
    #[must_use]
    pub fn primary_type(&self) -> Option<SessionType> {
        self.booked_type.or_else(|| self.types.first().copied())
    }

    /// Whether the store may delete the record at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time.is_some_and(|t| t <= now)
    }
}

/// How long after `end_time` a slot is kept before expiring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Retention {
    /// Retention for ordinary slots.
    pub standard: Duration,
    /// Retention for long-lived kinds.
    pub long_lived: Duration,
}

impl Retention {
    /// Expiration time for a slot of `kind` ending at `end_time`.
    #[must_use]
    pub fn expiration_for(&self, kind: SlotKind, end_time: DateTime<Utc>) -> DateTime<Utc> {
        if kind.is_long_lived() {
            end_time + self.long_lived
        } else {
            end_time + self.standard
        }
    }
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            standard: Duration::hours(48),
            long_lived: Duration::weeks(1),
        }
    }
}
