use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: String,
    #[serde(rename = "time_label")]
    pub label: String,
    pub duration: String,
    pub conflict: bool,
}

impl AvailabilitySlot {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        duration: impl Into<String>,
        conflict: bool,
    ) -> Self {
        Self { id: id.into(), label: label.into(), duration: duration.into(), conflict }
    }
}
