//! Cohorts and session types.
//!
//! A cohort is a rating band ("1500-1600") that gates who may see and book a
//! slot. Session types describe what the owner of a 1:1 availability is
//! willing to play or study.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every rating band a user can belong to, lowest first.
pub const KNOWN_COHORTS: [&str; 21] = [
    "0-400",
    "400-600",
    "600-700",
    "700-800",
    "800-900",
    "900-1000",
    "1000-1100",
    "1100-1200",
    "1200-1300",
    "1300-1400",
    "1400-1500",
    "1500-1600",
    "1600-1700",
    "1700-1800",
    "1800-1900",
    "1900-2000",
    "2000-2100",
    "2100-2200",
    "2200-2300",
    "2300-2400",
    "2400+",
];

/// Wildcard cohort: a slot listing it is open to every cohort.
pub const ALL_COHORTS: &str = "ALL_COHORTS";

/// A named eligibility band.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cohort(String);

impl Cohort {
    /// Wrap a cohort name. No validation happens here; see [`Cohort::is_valid`].
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The wildcard cohort.
    #[must_use]
    pub fn all() -> Self {
        Self(ALL_COHORTS.to_string())
    }

    /// The cohort name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the `ALL_COHORTS` wildcard.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0 == ALL_COHORTS
    }

    /// Whether this names a known band or the wildcard.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_wildcard() || KNOWN_COHORTS.contains(&self.0.as_str())
    }

    /// Whether this is a concrete band a user can belong to.
    #[must_use]
    pub fn is_member_band(&self) -> bool {
        KNOWN_COHORTS.contains(&self.0.as_str())
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Cohort {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Whether `cohort` may see slots offered to `offered`.
#[must_use]
pub fn cohort_matches(offered: &[Cohort], cohort: &Cohort) -> bool {
    offered.iter().any(|c| c.is_wildcard() || c == cohort)
}

/// Kind of session the owner of a 1:1 slot will accept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    /// A full classical game.
    ClassicalGame,
    /// Sparring from an opening position.
    OpeningSparring,
    /// Sparring from a middlegame position.
    MiddlegameSparring,
    /// Sparring from an endgame position.
    EndgameSparring,
    /// Rook endgame drills.
    RookEndgameProgression,
    /// Going through a classic game together.
    ClassicAnalysis,
    /// Reviewing one of the participants' games.
    AnalyzeOwnGame,
    /// Working through a book.
    BookStudy,
}

impl SessionType {
    /// All session types in catalogue order.
    pub const ALL: [Self; 8] = [
        Self::ClassicalGame,
        Self::OpeningSparring,
        Self::MiddlegameSparring,
        Self::EndgameSparring,
        Self::RookEndgameProgression,
        Self::ClassicAnalysis,
        Self::AnalyzeOwnGame,
        Self::BookStudy,
    ];

    /// Wire name, e.g. `CLASSICAL_GAME`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ClassicalGame => "CLASSICAL_GAME",
            Self::OpeningSparring => "OPENING_SPARRING",
            Self::MiddlegameSparring => "MIDDLEGAME_SPARRING",
            Self::EndgameSparring => "ENDGAME_SPARRING",
            Self::RookEndgameProgression => "ROOK_ENDGAME_PROGRESSION",
            Self::ClassicAnalysis => "CLASSIC_ANALYSIS",
            Self::AnalyzeOwnGame => "ANALYZE_OWN_GAME",
            Self::BookStudy => "BOOK_STUDY",
        }
    }

    /// Human readable name used in notifications.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::ClassicalGame => "Classical Game",
            Self::OpeningSparring => "Opening Sparring",
            Self::MiddlegameSparring => "Middlegame Sparring",
            Self::EndgameSparring => "Endgame Sparring",
            Self::RookEndgameProgression => "Rook Endgame Progression",
            Self::ClassicAnalysis => "Analyze Classic Game",
            Self::AnalyzeOwnGame => "Analyze Own Game",
            Self::BookStudy => "Book Study",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_is_valid_but_not_a_band() {
        let all = Cohort::all();
        assert!(all.is_valid());
        assert!(!all.is_member_band());
        assert!(Cohort::from("1500-1600").is_member_band());
        assert!(!Cohort::from("1550-1650").is_valid());
    }

    #[test]
    fn wildcard_matches_any_cohort() {
        let offered = vec![Cohort::all()];
        assert!(cohort_matches(&offered, &Cohort::from("0-400")));

        let offered = vec![Cohort::from("1500-1600")];
        assert!(cohort_matches(&offered, &Cohort::from("1500-1600")));
        assert!(!cohort_matches(&offered, &Cohort::from("1600-1700")));
    }

    #[test]
    fn session_type_wire_names_round_trip() {
        for t in SessionType::ALL {
            assert_eq!(SessionType::parse(t.as_str()), Some(t));
        }
        assert_eq!(SessionType::parse("BLITZ"), None);

        let json = serde_json::to_string(&SessionType::RookEndgameProgression).unwrap_or_default();
        assert_eq!(json, "\"ROOK_ENDGAME_PROGRESSION\"");
    }
}
