use anyhow::Result;
use repo_sync::{RepositoryId, VersionStore};

use super::format;

pub fn run(store: &dyn VersionStore, id: &RepositoryId) -> Result<()> {
    for number in store.versions(id)? {
        let delta = store.delta(id, number)?;
        let source = delta
            .provenance
            .as_ref()
            .map(|p| format!("{} ({})", p.remote_url, p.policy))
            .unwrap_or_else(|| "-".to_owned());

        println!(
            "{:>4}  +{:<5} -{:<5} {}",
            number,
            delta.added.len(),
            delta.removed.len(),
            format::truncate(&source, 70)
        );
    }
    Ok(())
}
