pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use fixtures::{demo_contacts, SeedDataset, SeedResult, VerificationResult};
pub use repositories::{
    ConversationStore, InMemoryConversationStore, InMemoryRecordStore, RecordStore,
    RepositoryError, SqlConversationStore, SqlRecordStore,
};
