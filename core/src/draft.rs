//! Caller-supplied slot payloads and their validation.
//!
//! A [`SlotDraft`] is what arrives over the wire: times are still strings,
//! cohorts and types are still names, and ownership fields are whatever the
//! caller claimed. [`SlotDraft::into_slot`] turns it into a [`Slot`] ready to
//! be saved, or rejects it with `Validation`/`Authorization` before the store
//! is ever touched.

use crate::cohort::{Cohort, SessionType};
use crate::error::SchedulingError;
use crate::gateway::User;
use crate::slot::{BROADCAST_OWNER, Retention, Slot, SlotId, SlotKind, SlotStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Location used for owner-authored slots that do not name one.
pub const DEFAULT_LOCATION: &str = "Discord";

/// Location used for broadcast slots that do not name one.
pub const DEFAULT_BROADCAST_LOCATION: &str = "No Location Provided";

/// A slot as submitted for creation or update.
///
/// Unknown fields (including any `participants` the caller sends) are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDraft {
    /// Existing id to update; a fresh id is generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Kind of session.
    #[serde(rename = "type")]
    pub kind: Option<SlotKind>,
    /// Claimed owner.
    #[serde(default)]
    pub owner: String,
    /// Owner's display name.
    #[serde(default)]
    pub owner_display_name: String,
    /// Owner's cohort; defaults to the caller's cohort.
    #[serde(default)]
    pub owner_cohort: Option<String>,
    /// Title, required for broadcast kinds.
    #[serde(default)]
    pub title: Option<String>,
    /// RFC 3339 start.
    #[serde(default)]
    pub start_time: String,
    /// RFC 3339 end.
    #[serde(default)]
    pub end_time: String,
    /// Session type names.
    #[serde(default)]
    pub types: Vec<String>,
    /// Eligible cohort names.
    #[serde(default)]
    pub cohorts: Vec<String>,
    /// Must be `SCHEDULED` when present.
    #[serde(default)]
    pub status: Option<SlotStatus>,
    /// Where the session happens.
    #[serde(default)]
    pub location: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Seat count; defaults to one.
    #[serde(default)]
    pub max_participants: Option<u32>,
}

impl SlotDraft {
    /// Validate the draft on behalf of `caller` and build the record to save.
    ///
    /// Authorization is checked first, so a caller without the right role
    /// learns nothing about the shape of their payload.
    ///
    /// # Errors
    ///
    /// - `Authorization`: owner is not the caller, or a broadcast kind without
    ///   the admin capability
    /// - `Validation`: any malformed or missing field
    pub fn into_slot(self, caller: &User, retention: &Retention) -> Result<Slot, SchedulingError> {
        let kind = self
            .kind
            .ok_or_else(|| SchedulingError::validation("type is required"))?;

        if kind.is_broadcast() {
            if !caller.is_admin {
                return Err(SchedulingError::authorization(format!(
                    "only admins can create {kind} events"
                )));
            }
        } else if self.owner != caller.username {
            return Err(SchedulingError::authorization(
                "owner must match the caller",
            ));
        }

        if let Some(status) = self.status {
            if status != SlotStatus::Scheduled {
                return Err(SchedulingError::validation(format!(
                    "status must be {} when saving, got {status}",
                    SlotStatus::Scheduled
                )));
            }
        }

        let start_time = parse_time("startTime", &self.start_time)?;
        let end_time = parse_time("endTime", &self.end_time)?;
        if start_time >= end_time {
            return Err(SchedulingError::validation(
                "startTime must be before endTime",
            ));
        }

        let max_participants = self.max_participants.unwrap_or(1);
        if max_participants < 1 {
            return Err(SchedulingError::validation(
                "maxParticipants must be at least 1",
            ));
        }

        let cohorts = parse_cohorts(&self.cohorts)?;
        let title = self.title.filter(|t| !t.trim().is_empty());
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .map_or_else(SlotId::generate, SlotId::new);

        let (owner, owner_display_name, owner_cohort, types, location) = if kind.is_broadcast() {
            if title.is_none() {
                return Err(SchedulingError::validation(format!(
                    "title is required for {kind} events"
                )));
            }
            (
                BROADCAST_OWNER.to_string(),
                BROADCAST_OWNER.to_string(),
                None,
                Vec::new(),
                self.location
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_BROADCAST_LOCATION.to_string()),
            )
        } else {
            if self.owner_display_name.trim().is_empty() {
                return Err(SchedulingError::validation("ownerDisplayName is required"));
            }
            let owner_cohort = self
                .owner_cohort
                .map_or_else(|| caller.cohort.clone(), Cohort::new);
            if !owner_cohort.is_member_band() {
                return Err(SchedulingError::validation(format!(
                    "invalid ownerCohort `{owner_cohort}`"
                )));
            }
            let types = parse_types(&self.types)?;
            if kind.requires_types() && max_participants == 1 && types.is_empty() {
                return Err(SchedulingError::validation(
                    "at least one type is required for one-on-one availabilities",
                ));
            }
            (
                self.owner,
                self.owner_display_name,
                Some(owner_cohort),
                types,
                self.location
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            )
        };

        Ok(Slot {
            id,
            kind,
            owner,
            owner_display_name,
            owner_cohort,
            title,
            start_time,
            end_time,
            booked_start_time: None,
            expiration_time: Some(retention.expiration_for(kind, end_time)),
            types,
            booked_type: None,
            cohorts,
            status: SlotStatus::Scheduled,
            location: Some(location),
            description: self.description.filter(|d| !d.is_empty()),
            max_participants,
            participants: BTreeMap::new(),
            messages: Vec::new(),
        })
    }
}

fn parse_time(field: &str, raw: &str) -> Result<DateTime<Utc>, SchedulingError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SchedulingError::validation(format!("invalid {field} `{raw}`: {e}")))
}

fn parse_cohorts(raw: &[String]) -> Result<Vec<Cohort>, SchedulingError> {
    if raw.is_empty() {
        return Err(SchedulingError::validation(
            "at least one cohort is required",
        ));
    }
    raw.iter()
        .map(|name| {
            let cohort = Cohort::new(name.clone());
            if cohort.is_valid() {
                Ok(cohort)
            } else {
                Err(SchedulingError::validation(format!("invalid cohort `{name}`")))
            }
        })
        .collect()
}

fn parse_types(raw: &[String]) -> Result<Vec<SessionType>, SchedulingError> {
    raw.iter()
        .map(|name| {
            SessionType::parse(name)
                .ok_or_else(|| SchedulingError::validation(format!("invalid type `{name}`")))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn alice() -> User {
        User {
            username: "alice".into(),
            display_name: "Alice".into(),
            cohort: Cohort::from("1500-1600"),
            previous_cohort: None,
            is_admin: false,
        }
    }

    fn draft() -> SlotDraft {
        SlotDraft {
            kind: Some(SlotKind::Availability),
            owner: "alice".into(),
            owner_display_name: "Alice".into(),
            start_time: "2025-01-01T10:00:00Z".into(),
            end_time: "2025-01-01T11:00:00Z".into(),
            types: vec!["CLASSICAL_GAME".into()],
            cohorts: vec!["1500-1600".into()],
            ..SlotDraft::default()
        }
    }

    fn rejects(d: SlotDraft, user: &User) -> SchedulingError {
        d.into_slot(user, &Retention::default()).unwrap_err()
    }

    #[test]
    fn valid_draft_builds_a_scheduled_slot() {
        let slot = draft().into_slot(&alice(), &Retention::default()).unwrap();
        assert_eq!(slot.status, SlotStatus::Scheduled);
        assert_eq!(slot.max_participants, 1);
        assert_eq!(slot.location.as_deref(), Some(DEFAULT_LOCATION));
        assert_eq!(slot.owner_cohort, Some(Cohort::from("1500-1600")));
        assert_eq!(
            slot.expiration_time,
            Some(slot.end_time + chrono::Duration::hours(48))
        );
    }

    #[test]
    fn given_id_is_kept() {
        let d = SlotDraft {
            id: Some("fixed".into()),
            ..draft()
        };
        let slot = d.into_slot(&alice(), &Retention::default()).unwrap();
        assert_eq!(slot.id, SlotId::new("fixed"));
    }

    #[test]
    fn owner_must_be_caller() {
        let d = SlotDraft {
            owner: "mallory".into(),
            ..draft()
        };
        assert!(matches!(rejects(d, &alice()), SchedulingError::Authorization(_)));
    }

    #[test]
    fn times_must_parse_and_be_ordered() {
        let bad = SlotDraft {
            start_time: "tomorrow".into(),
            ..draft()
        };
        assert!(matches!(rejects(bad, &alice()), SchedulingError::Validation(_)));

        let reversed = SlotDraft {
            start_time: "2025-01-01T12:00:00Z".into(),
            ..draft()
        };
        assert!(matches!(rejects(reversed, &alice()), SchedulingError::Validation(_)));
    }

    #[test]
    fn cohorts_and_types_are_checked() {
        let no_cohorts = SlotDraft {
            cohorts: vec![],
            ..draft()
        };
        assert!(matches!(rejects(no_cohorts, &alice()), SchedulingError::Validation(_)));

        let unknown = SlotDraft {
            cohorts: vec!["3000+".into()],
            ..draft()
        };
        assert!(matches!(rejects(unknown, &alice()), SchedulingError::Validation(_)));

        let no_types = SlotDraft {
            types: vec![],
            ..draft()
        };
        assert!(matches!(rejects(no_types, &alice()), SchedulingError::Validation(_)));

        let group_without_types = SlotDraft {
            types: vec![],
            max_participants: Some(5),
            ..draft()
        };
        assert!(group_without_types.into_slot(&alice(), &Retention::default()).is_ok());
    }

    #[test]
    fn saved_slots_always_start_scheduled() {
        let d = SlotDraft {
            status: Some(SlotStatus::Booked),
            ..draft()
        };
        assert!(matches!(rejects(d, &alice()), SchedulingError::Validation(_)));
    }

    #[test]
    fn broadcast_kinds_need_admin_and_title() {
        let dojo = SlotDraft {
            kind: Some(SlotKind::Dojo),
            title: Some("Weekly dojo".into()),
            cohorts: vec![crate::cohort::ALL_COHORTS.into()],
            max_participants: Some(100),
            ..draft()
        };
        assert!(matches!(
            rejects(dojo.clone(), &alice()),
            SchedulingError::Authorization(_)
        ));

        let admin = User {
            is_admin: true,
            ..alice()
        };
        let slot = dojo.clone().into_slot(&admin, &Retention::default()).unwrap();
        assert_eq!(slot.owner, BROADCAST_OWNER);
        assert!(slot.owner_cohort.is_none());
        assert!(slot.types.is_empty());
        assert_eq!(slot.location.as_deref(), Some(DEFAULT_BROADCAST_LOCATION));

        let untitled = SlotDraft { title: None, ..dojo };
        assert!(matches!(rejects(untitled, &admin), SchedulingError::Validation(_)));
    }

    #[test]
    fn payload_participants_are_ignored() {
        let json = serde_json::json!({
            "type": "AVAILABILITY",
            "owner": "alice",
            "ownerDisplayName": "Alice",
            "startTime": "2025-01-01T10:00:00Z",
            "endTime": "2025-01-01T11:00:00Z",
            "types": ["CLASSICAL_GAME"],
            "cohorts": ["1500-1600"],
            "participants": {"bob": {"username": "bob"}}
        });
        let d: SlotDraft = serde_json::from_value(json).unwrap();
        let slot = d.into_slot(&alice(), &Retention::default()).unwrap();
        assert!(slot.participants.is_empty());
    }
}
