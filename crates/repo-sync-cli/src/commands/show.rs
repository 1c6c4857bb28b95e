use anyhow::Result;
use repo_sync::{RepositoryId, VersionStore};
use repo_sync_store::{SqliteVersionStore, UnitFilter};

use super::format;

pub fn run(
    store: &SqliteVersionStore,
    id: &RepositoryId,
    version: Option<u64>,
    filter: &UnitFilter,
) -> Result<()> {
    let number = match version {
        Some(n) => n,
        None => store.latest(id)?.number,
    };

    let units = if filter.is_empty() {
        store.version(id, number)?.content.into_iter().collect()
    } else {
        store.search(id, number, filter)?
    };

    println!("{id} version {number}");
    if number > 0 {
        let summary = store.summary(id, number)?;
        println!("{}", format::summary_line(&summary));
    }
    println!();
    format::print_unit_table(&units);

    Ok(())
}
