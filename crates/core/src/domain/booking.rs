use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::thread::OwnerId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(pub String);

impl BookingId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
        }
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "confirmed" => Ok(Self::Confirmed),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown booking status `{other}`"
            ))),
        }
    }
}

/// Free-text invite fields as drafted or edited by the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftInvite {
    pub subject: String,
    pub agenda: String,
    pub location: String,
    pub attendees: String,
    pub time: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteDefaults {
    pub subject: String,
    pub location: String,
    pub time: String,
}

impl Default for InviteDefaults {
    fn default() -> Self {
        Self {
            subject: "No Subject".to_owned(),
            location: "Zoom".to_owned(),
            time: "TBD".to_owned(),
        }
    }
}

/// Invite fields read from an action payload; any of them may be missing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteFields {
    pub subject: Option<String>,
    pub agenda: Option<String>,
    pub location: Option<String>,
    pub attendees: Option<String>,
    pub time: Option<String>,
}

impl InviteFields {
    pub fn into_draft(self, defaults: &InviteDefaults) -> DraftInvite {
        DraftInvite {
            subject: self.subject.unwrap_or_else(|| defaults.subject.clone()),
            agenda: self.agenda.unwrap_or_default(),
            location: self.location.unwrap_or_else(|| defaults.location.clone()),
            attendees: self.attendees.unwrap_or_default(),
            time: self.time.unwrap_or_else(|| defaults.time.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    pub id: BookingId,
    pub organizer: OwnerId,
    pub subject: String,
    pub agenda: String,
    pub start_time: String,
    pub end_time: String,
    pub attendees: String,
    pub location: String,
    pub status: BookingStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedEvent {
    pub id: BookingId,
    pub organizer: OwnerId,
    pub subject: String,
    pub agenda: String,
    pub start_time: String,
    pub end_time: String,
    pub attendees: String,
    pub location: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl BookedEvent {
    pub fn summary_line(&self) -> String {
        format!(
            "- {} at {} with {} (Location: {})",
            self.subject, self.start_time, self.attendees, self.location
        )
    }
}
