//! Schema upgrades of the run-metadata database.
//!
//! Upgrades are applied one version at a time. Each step runs inside a single
//! transaction together with the `user_version` bump, so a failed step leaves
//! the database exactly as it was before the call.

use log::info;

use super::description;
use super::registry::RunRegistry;
use crate::error::{AppResult, DaqError};

/// Latest schema version known to this crate.
pub const LATEST_SCHEMA_VERSION: i64 = 6;

/// Oldest schema version that can be upgraded from.
pub const OLDEST_UPGRADABLE_VERSION: i64 = 5;

type UpgradeFn = fn(&RunRegistry) -> AppResult<()>;

/// Registered upgrades, keyed by the version they upgrade *from*.
const UPGRADES: [(i64, UpgradeFn); 1] = [(5, upgrade_5_to_6)];

/// Log a progress line every this many runs.
const PROGRESS_INTERVAL: i64 = 1000;

/// Perform the upgrade from version 5 to version 6.
///
/// Gives every run description a top-level `version` entry, placed first.
/// Version changes of the run description itself are not schema upgrades.
/// If one run fails, the whole upgrade rolls back.
pub fn upgrade_5_to_6(registry: &RunRegistry) -> AppResult<()> {
    let max_run_id = registry.max_run_id()?;

    registry.atomic(|registry| {
        info!("Upgrading database, version 5 -> 6 ({} runs)", max_run_id);

        for run_id in 1..=max_run_id {
            let raw = registry.get_description(run_id)?;
            let upgraded = description::decode(raw.as_deref()).map_err(|e| match e {
                DaqError::MalformedDocument(msg) => {
                    DaqError::MalformedDocument(format!("run {run_id}: {msg}"))
                }
                other => other,
            })?;
            registry.set_description(run_id, &description::encode(&upgraded)?)?;

            if run_id % PROGRESS_INTERVAL == 0 {
                info!("Upgraded {}/{} runs", run_id, max_run_id);
            }
        }

        info!("Upgraded {}/{} runs", max_run_id, max_run_id);
        Ok(())
    })
}

/// Upgrade the database to `target_version`.
///
/// Returns the version the database ends up at. Calling this on a database
/// already at (or past) `target_version` does nothing.
pub fn perform_db_upgrade(registry: &RunRegistry, target_version: i64) -> AppResult<i64> {
    if target_version > LATEST_SCHEMA_VERSION {
        return Err(DaqError::UnsupportedSchemaVersion {
            found: target_version,
            reason: format!("latest known version is {LATEST_SCHEMA_VERSION}"),
        });
    }

    let mut current = registry.schema_version()?;
    if current >= target_version {
        info!("Database already at version {}", current);
        return Ok(current);
    }
    if current < OLDEST_UPGRADABLE_VERSION {
        return Err(DaqError::UnsupportedSchemaVersion {
            found: current,
            reason: format!("upgrades start at version {OLDEST_UPGRADABLE_VERSION}"),
        });
    }

    while current < target_version {
        let (_, upgrade) = UPGRADES
            .iter()
            .find(|(from, _)| *from == current)
            .ok_or_else(|| DaqError::UnsupportedSchemaVersion {
                found: current,
                reason: "no upgrade registered".to_string(),
            })?;

        let next = current + 1;
        registry.atomic(|registry| {
            upgrade(registry)?;
            registry.set_schema_version(next)
        })?;
        info!("Database upgraded to version {}", next);
        current = next;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_at(version: i64) -> RunRegistry {
        let registry = RunRegistry::open_in_memory().unwrap();
        registry.create_schema().unwrap();
        registry.set_schema_version(version).unwrap();
        registry
    }

    #[test]
    fn test_upgrade_empty_store() {
        let registry = registry_at(5);
        upgrade_5_to_6(&registry).unwrap();
        assert_eq!(registry.max_run_id().unwrap(), 0);
    }

    #[test]
    fn test_null_description_gets_empty_document() {
        let registry = registry_at(5);
        registry.add_run(None).unwrap();
        upgrade_5_to_6(&registry).unwrap();
        assert_eq!(
            registry.get_description(1).unwrap().as_deref(),
            Some(r#"{"version":0,"interdependencies":{"paramspecs":[]}}"#)
        );
    }

    #[test]
    fn test_perform_db_upgrade_bumps_version() {
        let registry = registry_at(5);
        registry
            .add_run(Some(r#"{"interdependencies":{"paramspecs":[]}}"#))
            .unwrap();
        assert_eq!(perform_db_upgrade(&registry, 6).unwrap(), 6);
        assert_eq!(registry.schema_version().unwrap(), 6);
        // second call is a no-op
        assert_eq!(perform_db_upgrade(&registry, 6).unwrap(), 6);
    }

    #[test]
    fn test_perform_db_upgrade_rejects_old_schema() {
        let registry = registry_at(3);
        assert!(matches!(
            perform_db_upgrade(&registry, 6),
            Err(DaqError::UnsupportedSchemaVersion { found: 3, .. })
        ));
    }

    #[test]
    fn test_failed_upgrade_keeps_schema_version() {
        let registry = registry_at(5);
        registry.add_run(Some("{broken")).unwrap();
        assert!(perform_db_upgrade(&registry, 6).is_err());
        assert_eq!(registry.schema_version().unwrap(), 5);
    }

    #[test]
    fn test_unknown_target_version() {
        let registry = registry_at(5);
        assert!(perform_db_upgrade(&registry, 7).is_err());
    }
}
