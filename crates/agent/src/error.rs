use meetbook_chat::WidgetPayloadError;
use meetbook_core::{ApplicationError, DomainError, WidgetTransitionError};
use meetbook_db::RepositoryError;
use thiserror::Error;

use crate::policy::PolicyError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("decision policy failed: {0}")]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    WidgetPayload(#[from] WidgetPayloadError),
}

impl From<WidgetTransitionError> for SchedulerError {
    fn from(error: WidgetTransitionError) -> Self {
        Self::Domain(DomainError::from(error))
    }
}

impl SchedulerError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::Domain(DomainError::not_found(entity, id))
    }
}

impl From<SchedulerError> for ApplicationError {
    fn from(error: SchedulerError) -> Self {
        match error {
            SchedulerError::Domain(domain) => Self::Domain(domain),
            SchedulerError::Repository(RepositoryError::NotFound { entity, id }) => {
                Self::Domain(DomainError::NotFound { entity, id })
            }
            SchedulerError::Repository(other) => Self::Persistence(other.to_string()),
            SchedulerError::Policy(policy) => Self::UpstreamPolicy(policy.to_string()),
            SchedulerError::WidgetPayload(payload) => {
                Self::Domain(DomainError::InvariantViolation(payload.to_string()))
            }
        }
    }
}
