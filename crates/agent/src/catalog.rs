use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use meetbook_chat::widgets;
use meetbook_core::{AvailabilitySlot, ContactId, DraftInvite, InviteDefaults, OwnerId, Widget};
use meetbook_db::RecordStore;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::SchedulerError;
use crate::policy::{OperationCall, OperationSpec, PolicyConfig};

pub const SEARCH_CONTACTS: &str = "search_contacts";
pub const FIND_AVAILABILITY: &str = "find_availability";
pub const DRAFT_INVITE: &str = "draft_invite";
pub const CHECK_SCHEDULE: &str = "check_schedule";

pub const SCHEDULER_INSTRUCTIONS: &str = "\
You are an executive assistant that books meetings for the user.

Follow this workflow strictly:
1. Identify contacts. When the user wants to meet someone, call `search_contacts`, even when a \
full name is given; the user confirms the right people in the picker.
2. Find a time. Once contacts are confirmed (reported inside <USER_ACTION> tags), call \
`find_availability` with the confirmed contact ids.
3. Draft the invite. Once a slot is picked, call `draft_invite` with a subject, a short agenda, \
the picked time and the attendee names.

Never claim a meeting is booked before the user presses Send on the invite editor.
Use `check_schedule` whenever the user asks what is already on their calendar.
Keep replies professional and concise.";

/// Source of candidate meeting slots for a set of attendees.
#[async_trait]
pub trait SlotProvider: Send + Sync {
    async fn slots_for(&self, attendee_ids: &[ContactId]) -> Vec<AvailabilitySlot>;
}

/// The same three slots for everyone.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedSlotProvider;

#[async_trait]
impl SlotProvider for FixedSlotProvider {
    async fn slots_for(&self, _attendee_ids: &[ContactId]) -> Vec<AvailabilitySlot> {
        vec![
            AvailabilitySlot::new("slot_1", "Today, 2:00 PM", "1 hour", false),
            AvailabilitySlot::new("slot_2", "Today, 4:30 PM", "30 mins", true),
            AvailabilitySlot::new("slot_3", "Tomorrow, 10:00 AM", "1 hour", false),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationStatus {
    Completed,
    /// Ran, but found nothing to show.
    Empty,
    /// Unknown operation or malformed arguments; nothing was shown.
    Rejected,
}

/// What one invocation produced: an optional message and widget for the user,
/// and the text fed back to the policy.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationOutput {
    pub status: OperationStatus,
    pub message: Option<String>,
    pub widget: Option<Widget>,
    pub result: String,
}

impl OperationOutput {
    fn rejected(result: String) -> Self {
        Self { status: OperationStatus::Rejected, message: None, widget: None, result }
    }

    pub fn is_error(&self) -> bool {
        self.status != OperationStatus::Completed
    }
}

#[derive(Debug, Deserialize)]
struct SearchContactsArgs {
    query: String,
}

#[derive(Debug, Deserialize)]
struct FindAvailabilityArgs {
    attendee_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NameList {
    Joined(String),
    Each(Vec<String>),
}

impl NameList {
    fn joined(self) -> String {
        match self {
            Self::Joined(names) => names.trim().to_owned(),
            Self::Each(names) => names
                .iter()
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DraftInviteArgs {
    subject: String,
    #[serde(default)]
    agenda: String,
    #[serde(alias = "slot_time")]
    slot_time_str: String,
    attendee_names: NameList,
    #[serde(default)]
    location: Option<String>,
}

pub struct OperationCatalog {
    records: Arc<dyn RecordStore>,
    slots: Arc<dyn SlotProvider>,
    defaults: InviteDefaults,
}

impl OperationCatalog {
    pub fn new(
        records: Arc<dyn RecordStore>,
        slots: Arc<dyn SlotProvider>,
        defaults: InviteDefaults,
    ) -> Self {
        Self { records, slots, defaults }
    }

    pub fn specs(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec {
                name: SEARCH_CONTACTS.to_owned(),
                description: "Searches the user's address book for contacts matching a name or \
                    email and shows a contact picker so the user can confirm the match."
                    .to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Name or email fragment, e.g. 'Bob' or 'bob@example.com'" }
                    },
                    "required": ["query"]
                }),
            },
            OperationSpec {
                name: FIND_AVAILABILITY.to_owned(),
                description: "Checks availability for a group of attendees and shows a time \
                    picker with the best open slots."
                    .to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "attendee_ids": { "type": "array", "items": { "type": "string" }, "description": "Confirmed contact ids" }
                    },
                    "required": ["attendee_ids"]
                }),
            },
            OperationSpec {
                name: DRAFT_INVITE.to_owned(),
                description: "Shows an editable draft of the meeting invitation for review. \
                    Always use this before any invite is sent."
                    .to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "subject": { "type": "string" },
                        "agenda": { "type": "string" },
                        "slot_time_str": { "type": "string", "description": "The picked time slot label" },
                        "attendee_names": { "type": "string", "description": "Comma-separated attendee names" },
                        "location": { "type": "string", "description": format!("Defaults to {}", self.defaults.location) }
                    },
                    "required": ["subject", "agenda", "slot_time_str", "attendee_names"]
                }),
            },
            OperationSpec {
                name: CHECK_SCHEDULE.to_owned(),
                description: "Lists the meetings already booked on the user's calendar.".to_owned(),
                parameters: json!({ "type": "object", "properties": {} }),
            },
        ]
    }

    /// Instructions, catalog and the operations after which the policy must
    /// yield to the user.
    pub fn policy_config(&self) -> PolicyConfig {
        PolicyConfig {
            instructions: SCHEDULER_INSTRUCTIONS.to_owned(),
            operations: self.specs(),
            forced_stops: [SEARCH_CONTACTS, FIND_AVAILABILITY, DRAFT_INVITE]
                .into_iter()
                .map(str::to_owned)
                .collect::<BTreeSet<_>>(),
        }
    }

    pub async fn execute(
        &self,
        owner: &OwnerId,
        call: &OperationCall,
    ) -> Result<OperationOutput, SchedulerError> {
        match call.name.as_str() {
            SEARCH_CONTACTS => match parse_args::<SearchContactsArgs>(call) {
                Ok(args) => self.search_contacts(owner, &args.query).await,
                Err(rejected) => Ok(rejected),
            },
            FIND_AVAILABILITY => match parse_args::<FindAvailabilityArgs>(call) {
                Ok(args) => self.find_availability(&args.attendee_ids).await,
                Err(rejected) => Ok(rejected),
            },
            DRAFT_INVITE => match parse_args::<DraftInviteArgs>(call) {
                Ok(args) => self.draft_invite(args),
                Err(rejected) => Ok(rejected),
            },
            CHECK_SCHEDULE => self.check_schedule(owner).await,
            unknown => Ok(OperationOutput::rejected(format!(
                "Unknown operation '{unknown}'. Available operations: {SEARCH_CONTACTS}, \
                 {FIND_AVAILABILITY}, {DRAFT_INVITE}, {CHECK_SCHEDULE}."
            ))),
        }
    }

    async fn search_contacts(
        &self,
        owner: &OwnerId,
        query: &str,
    ) -> Result<OperationOutput, SchedulerError> {
        let contacts = self.records.find_contacts(owner, query).await?;

        if contacts.is_empty() {
            return Ok(OperationOutput {
                status: OperationStatus::Empty,
                message: Some(format!(
                    "I'm sorry, I couldn't find any contacts matching '{query}'."
                )),
                widget: None,
                result: "No contacts found.".to_owned(),
            });
        }

        let matches = contacts
            .iter()
            .map(|contact| format!("{} <{}> (id: {}, role: {})", contact.name, contact.email, contact.id, contact.role))
            .collect::<Vec<_>>()
            .join("; ");

        Ok(OperationOutput {
            status: OperationStatus::Completed,
            message: Some(format!(
                "I found {} contacts. Please select the ones you'd like to invite.",
                contacts.len()
            )),
            widget: Some(widgets::contact_picker(&contacts)?),
            result: format!(
                "SUCCESS: Displayed Contact Picker widget with the following matches: {matches}. \
                 Waiting for user to confirm selection via UI action."
            ),
        })
    }

    async fn find_availability(
        &self,
        attendee_ids: &[String],
    ) -> Result<OperationOutput, SchedulerError> {
        let ids = attendee_ids
            .iter()
            .map(|id| ContactId(id.trim().to_owned()))
            .filter(|id| !id.0.is_empty())
            .collect::<Vec<_>>();
        let slots = self.slots.slots_for(&ids).await;

        Ok(OperationOutput {
            status: OperationStatus::Completed,
            message: Some(
                "I've analyzed the schedules for all participants. Here are the best available slots:"
                    .to_owned(),
            ),
            widget: Some(widgets::time_picker(&slots)?),
            result: format!(
                "Analyzed availability for attendees [{}] and displayed time picker widget to user.",
                ids.iter().map(|id| id.0.as_str()).collect::<Vec<_>>().join(", ")
            ),
        })
    }

    fn draft_invite(&self, args: DraftInviteArgs) -> Result<OperationOutput, SchedulerError> {
        let draft = DraftInvite {
            subject: args.subject.trim().to_owned(),
            agenda: args.agenda,
            location: args
                .location
                .map(|location| location.trim().to_owned())
                .filter(|location| !location.is_empty())
                .unwrap_or_else(|| self.defaults.location.clone()),
            attendees: args.attendee_names.joined(),
            time: args.slot_time_str.trim().to_owned(),
        };

        Ok(OperationOutput {
            status: OperationStatus::Completed,
            message: Some(
                "I've drafted the invitation. Please review the agenda and subject below. \
                 You can edit them directly if needed."
                    .to_owned(),
            ),
            widget: Some(widgets::invite_editor(&draft)?),
            result: format!(
                "Drafted meeting invite with subject '{}' for attendees {} and displayed invite \
                 editor widget to user.",
                draft.subject, draft.attendees
            ),
        })
    }

    async fn check_schedule(&self, owner: &OwnerId) -> Result<OperationOutput, SchedulerError> {
        let bookings = self.records.list_bookings(owner).await?;

        let result = if bookings.is_empty() {
            "Your calendar is currently empty. No meetings are scheduled.".to_owned()
        } else {
            let mut summary = "Here are your scheduled meetings:\n".to_owned();
            for booking in &bookings {
                summary.push_str(&booking.summary_line());
                summary.push('\n');
            }
            summary
        };

        Ok(OperationOutput {
            status: OperationStatus::Completed,
            message: None,
            widget: None,
            result,
        })
    }
}

fn parse_args<T>(call: &OperationCall) -> Result<T, OperationOutput>
where
    T: for<'de> Deserialize<'de>,
{
    let arguments = match &call.arguments {
        Value::Null => json!({}),
        other => other.clone(),
    };
    serde_json::from_value(arguments).map_err(|error| {
        OperationOutput::rejected(format!("Invalid arguments for '{}': {error}", call.name))
    })
}
