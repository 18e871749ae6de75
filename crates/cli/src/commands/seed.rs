use crate::commands::{load_config, runtime, CommandResult, StepFailure};
use meetbook_db::{connect_from_config, migrations, SeedDataset};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = SeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = SeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let outcome: Result<String, StepFailure> = if verification.all_present {
            Ok(summary(&seeded.users_seeded, &seeded.contacts_seeded))
        } else {
            Err(("seed_verification", verification_failure(&verification.checks), 6u8))
        };

        pool.close().await;
        outcome
    });

    match result {
        Ok(message) => CommandResult::success("seed", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(users: &[&str], contacts: &[&str]) -> String {
    format!(
        "demo directory loaded:\n  - users: {}\n  - contacts: {}",
        users.join(", "),
        contacts.join(", ")
    )
}

fn verification_failure(checks: &[(&str, bool)]) -> String {
    let missing = checks
        .iter()
        .filter_map(|(row, present)| (!present).then_some(*row))
        .collect::<Vec<_>>();
    if missing.is_empty() {
        "Some seed rows failed to load".to_string()
    } else {
        format!("Seed verification failed for rows: {}", missing.join(", "))
    }
}
