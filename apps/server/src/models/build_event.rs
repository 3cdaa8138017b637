//! Build webhook payloads.
//!
//! The CI server posts one of these for every build state change. Only the
//! fields needed to decide whether to notify and to fill the email are
//! modelled; everything else in the payload is ignored.

use serde::{Deserialize, Serialize};

/// Build status that triggers a notification
pub const FAILURE_STATUS: &str = "failure";

// =============================================================================
// Event Kind / Action
// =============================================================================

/// Top-level webhook event type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Build,
    #[default]
    #[serde(other)]
    Other,
}

/// What happened to the object named by the event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Updated,
    #[default]
    #[serde(other)]
    Other,
}

// =============================================================================
// Payload
// =============================================================================

/// Decoded webhook request body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildEvent {
    pub event: EventKind,
    pub action: Action,
    pub build: Option<Build>,
    pub repo: Option<Repo>,
    pub system: Option<System>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Build {
    pub id: i64,
    /// Sequential per repository, not globally unique
    pub number: i64,
    pub status: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub message: String,
    /// Commit hash the build ran against
    pub after: String,
    pub author: String,
    pub author_name: String,
    pub author_email: String,
    pub author_avatar: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Repo {
    pub slug: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct System {
    pub host: String,
    pub link: String,
}

impl Build {
    /// Display name of the commit author, falling back to their handle
    pub fn author_display_name(&self) -> &str {
        if self.author_name.is_empty() {
            &self.author
        } else {
            &self.author_name
        }
    }

    /// First 8 characters of the commit hash (shorter hashes are kept whole)
    pub fn short_hash(&self) -> &str {
        match self.after.char_indices().nth(8) {
            Some((end, _)) => &self.after[..end],
            None => &self.after,
        }
    }

    /// First line of the trimmed commit message
    pub fn commit_summary(&self) -> &str {
        self.message
            .trim()
            .lines()
            .next()
            .map(str::trim_end)
            .unwrap_or_default()
    }

    pub fn is_failure(&self) -> bool {
        self.status == FAILURE_STATUS
    }
}

impl BuildEvent {
    /// Build number for log correlation, if the payload carries a build
    pub fn build_number(&self) -> Option<i64> {
        self.build.as_ref().map(|build| build.number)
    }
}

/// Returns true when the event reports a build that has just failed.
///
/// Payloads without a `build` object never match; this is not an error.
pub fn should_notify(event: &BuildEvent) -> bool {
    event.event == EventKind::Build
        && event.action == Action::Updated
        && event.build.as_ref().is_some_and(Build::is_failure)
}
