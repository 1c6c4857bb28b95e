use std::collections::BTreeSet;

use anyhow::{Context, Result};
use repo_sync::{ContentUnit, Modification, RepositoryId, UnitKey, VersionStore, modify};

use super::format;

pub fn create(store: &dyn VersionStore, name: &str) -> Result<()> {
    let id = RepositoryId::new(name);
    store.create_repository(&id)?;
    println!("Created repository {id} at version 0.");
    Ok(())
}

pub fn list(store: &dyn VersionStore) -> Result<()> {
    let repositories = store.repositories()?;
    if repositories.is_empty() {
        println!("No repositories. Create one with `repo-sync repo create <name>`.");
        return Ok(());
    }

    for id in &repositories {
        let latest = store.latest(id)?;
        println!(
            "{:<24}  version {:>4}  {} units",
            id.as_str(),
            latest.number,
            latest.content.len()
        );
    }

    Ok(())
}

/// Add and remove units by hand, creating a new version.
pub fn modify_content(
    store: &dyn VersionStore,
    name: &str,
    base: Option<u64>,
    kind: &str,
    add: &[String],
    remove: &[String],
) -> Result<()> {
    let id = RepositoryId::new(name);
    let modification = Modification {
        base,
        add: add
            .iter()
            .map(|spec| parse_unit_key(kind, spec).map(ContentUnit::new))
            .collect::<Result<BTreeSet<_>>>()?,
        remove: remove
            .iter()
            .map(|spec| parse_unit_key(kind, spec))
            .collect::<Result<BTreeSet<_>>>()?,
    };
    if modification.is_empty() {
        anyhow::bail!("nothing to do: pass --add or --remove");
    }

    let outcome = modify(store, &id, &modification)
        .with_context(|| format!("failed to modify repository {id}"))?;

    if outcome.is_created() {
        let version = outcome.version();
        println!("Created version {} of {id}.", version.number);
        let delta = store.delta(&id, version.number)?;
        format::print_changes(&delta.added, &delta.removed);
    } else {
        println!("No changes; {id} stays at version {}.", outcome.version().number);
    }
    Ok(())
}

/// Parse `NAME:VERSION` into a key of `kind`.
fn parse_unit_key(kind: &str, spec: &str) -> Result<UnitKey> {
    match spec.split_once(':') {
        Some((name, version)) if !name.is_empty() && !version.is_empty() => {
            Ok(UnitKey::new(kind, name, version))
        }
        _ => anyhow::bail!("invalid unit '{spec}' (expected NAME:VERSION)"),
    }
}
