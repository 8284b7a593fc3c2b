//! User directory loaded from a JSON file at startup.
//!
//! The file holds an array of users:
//!
//! ```json
//! [
//!   { "username": "alice", "displayName": "Alice", "cohort": "1500-1600" },
//!   { "username": "sensei", "cohort": "2400+", "isAdmin": true }
//! ]
//! ```
//!
//! `displayName` defaults to the username; `previousCohort` and `isAdmin`
//! are optional.

use dojo_scheduler_core::cohort::Cohort;
use dojo_scheduler_core::error::GatewayError;
use dojo_scheduler_core::gateway::{GatewayFuture, User, UserGetter};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors loading the users file.
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// The file could not be read.
    #[error("Failed to read users file {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a JSON array of users.
    #[error("Invalid users file: {0}")]
    Parse(#[from] serde_json::Error),

    /// A user's cohort is not a rating band from the catalogue.
    #[error("User {username} has unknown cohort {cohort}")]
    UnknownCohort {
        /// Offending user.
        username: String,
        /// Cohort as written in the file.
        cohort: String,
    },

    /// The same username appears twice.
    #[error("Duplicate user: {0}")]
    Duplicate(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UserEntry {
    username: String,
    #[serde(default)]
    display_name: Option<String>,
    cohort: Cohort,
    #[serde(default)]
    previous_cohort: Option<Cohort>,
    #[serde(default)]
    is_admin: bool,
}

/// Read-only [`UserGetter`] over the users listed in a file.
#[derive(Clone, Debug, Default)]
pub struct FileUserDirectory {
    users: Arc<HashMap<String, User>>,
}

impl FileUserDirectory {
    /// Read and parse the users file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] if the file cannot be read or holds an
    /// invalid entry.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| DirectoryError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json(&raw)
    }

    /// Parse a JSON array of users.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] on malformed JSON, an unknown cohort or a
    /// duplicate username.
    pub fn from_json(raw: &str) -> Result<Self, DirectoryError> {
        let entries: Vec<UserEntry> = serde_json::from_str(raw)?;
        let mut users = HashMap::with_capacity(entries.len());
        for entry in entries {
            for cohort in std::iter::once(&entry.cohort).chain(&entry.previous_cohort) {
                if !cohort.is_member_band() {
                    return Err(DirectoryError::UnknownCohort {
                        cohort: cohort.as_str().to_string(),
                        username: entry.username,
                    });
                }
            }
            let user = User {
                display_name: entry.display_name.unwrap_or_else(|| entry.username.clone()),
                username: entry.username,
                cohort: entry.cohort,
                previous_cohort: entry.previous_cohort,
                is_admin: entry.is_admin,
            };
            if users.contains_key(&user.username) {
                return Err(DirectoryError::Duplicate(user.username));
            }
            users.insert(user.username.clone(), user);
        }
        Ok(Self {
            users: Arc::new(users),
        })
    }

    /// Number of known users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether no users are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserGetter for FileUserDirectory {
    fn get(&self, username: &str) -> GatewayFuture<'_, User> {
        let found = self
            .users
            .get(username)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownUser(username.to_string()));
        Box::pin(async move { found })
    }
}
