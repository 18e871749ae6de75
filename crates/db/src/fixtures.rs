use sqlx::Executor;

use meetbook_core::domain::contact::{Contact, ContactId};
use meetbook_core::domain::thread::OwnerId;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

struct SeedUser {
    id: &'static str,
    name: &'static str,
    email: &'static str,
}

struct SeedContact {
    id: &'static str,
    owner_id: &'static str,
    name: &'static str,
    email: &'static str,
    role: &'static str,
    avatar_url: &'static str,
}

const SEED_USERS: &[SeedUser] = &[
    SeedUser { id: "alice", name: "Alice Executive", email: "alice@example.com" },
    SeedUser { id: "bob", name: "Bob Manager", email: "bob@example.com" },
];

const SEED_CONTACTS: &[SeedContact] = &[
    SeedContact {
        id: "c1",
        owner_id: "alice",
        name: "Bob Manager",
        email: "bob@example.com",
        role: "Product Manager",
        avatar_url: "https://i.pravatar.cc/150?u=bob",
    },
    SeedContact {
        id: "c2",
        owner_id: "alice",
        name: "Charlie Designer",
        email: "charlie@example.com",
        role: "Lead Designer",
        avatar_url: "https://i.pravatar.cc/150?u=charlie",
    },
    SeedContact {
        id: "c3",
        owner_id: "alice",
        name: "Dana Engineer",
        email: "dana@example.com",
        role: "CTO",
        avatar_url: "https://i.pravatar.cc/150?u=dana",
    },
];

/// The demo address book as domain values, for stores that are not backed by SQL.
pub fn demo_contacts() -> Vec<Contact> {
    SEED_CONTACTS
        .iter()
        .map(|contact| Contact {
            id: ContactId(contact.id.to_string()),
            owner: OwnerId(contact.owner_id.to_string()),
            name: contact.name.to_string(),
            email: contact.email.to_string(),
            role: contact.role.to_string(),
            avatar_url: Some(contact.avatar_url.to_string()),
        })
        .collect()
}

/// Demo directory: users `alice` and `bob`, and Alice's three contacts.
///
/// Loading is idempotent; rows are upserted by id.
pub struct SeedDataset;

impl SeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/seed_data.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            users_seeded: SEED_USERS.iter().map(|user| user.id).collect(),
            contacts_seeded: SEED_CONTACTS.iter().map(|contact| contact.id).collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for user in SEED_USERS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1 AND name = ?2 AND email = ?3)",
            )
            .bind(user.id)
            .bind(user.name)
            .bind(user.email)
            .fetch_one(pool)
            .await?;
            checks.push((user.id, exists == 1));
        }

        for contact in SEED_CONTACTS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM contacts
                               WHERE id = ?1 AND owner_id = ?2 AND name = ?3
                                 AND email = ?4 AND role = ?5 AND avatar_url = ?6)",
            )
            .bind(contact.id)
            .bind(contact.owner_id)
            .bind(contact.name)
            .bind(contact.email)
            .bind(contact.role)
            .bind(contact.avatar_url)
            .fetch_one(pool)
            .await?;
            checks.push((contact.id, exists == 1));
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the seeded rows along with any bookings organized by seeded users.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        for user in SEED_USERS {
            sqlx::query("DELETE FROM events WHERE organizer_id = ?")
                .bind(user.id)
                .execute(&mut *tx)
                .await?;
        }
        for contact in SEED_CONTACTS {
            sqlx::query("DELETE FROM contacts WHERE id = ?")
                .bind(contact.id)
                .execute(&mut *tx)
                .await?;
        }
        for user in SEED_USERS {
            sqlx::query("DELETE FROM users WHERE id = ?").bind(user.id).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub users_seeded: Vec<&'static str>,
    pub contacts_seeded: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(SeedDataset::SQL.contains("INSERT INTO users"));
        assert!(SeedDataset::SQL.contains("INSERT INTO contacts"));
    }

    #[test]
    fn demo_contacts_match_seed_rows() {
        let contacts = demo_contacts();
        assert_eq!(contacts.len(), 3);
        assert!(contacts.iter().all(|contact| contact.owner.0 == "alice"));
        assert_eq!(contacts[0].name, "Bob Manager");
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = SeedDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification = SeedDataset::verify(&pool).await.expect("verify seed fixtures");
        assert!(first_verification.all_present);
        assert_eq!(first.users_seeded, vec!["alice", "bob"]);
        assert_eq!(first.contacts_seeded.len(), 3);

        SeedDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification =
            SeedDataset::verify(&pool).await.expect("re-verify seed fixtures");
        assert!(second_verification.all_present);
        assert_eq!(first_verification.checks, second_verification.checks);

        let contact_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM contacts")
            .fetch_one(&pool)
            .await
            .expect("count contacts");
        assert_eq!(contact_count, 3);
    }

    #[tokio::test]
    async fn clean_removes_seeded_rows() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");
        SeedDataset::load(&pool).await.expect("load seed fixtures");

        SeedDataset::clean(&pool).await.expect("clean seed fixtures");

        let verification = SeedDataset::verify(&pool).await.expect("verify after clean");
        assert!(!verification.all_present);
        assert!(verification.checks.iter().all(|(_, present)| !present));
    }
}
