use rusqlite_migration::{M, Migrations};

/// Content membership is stored as ranges: a unit belongs to every version
/// `n` with `version_added <= n` and `version_removed` unset or `> n`.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "CREATE TABLE repositories (
            name            TEXT PRIMARY KEY,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE versions (
            repository      TEXT NOT NULL,
            number          INTEGER NOT NULL,
            remote_url      TEXT,
            policy          TEXT,
            created_at      TEXT NOT NULL,
            PRIMARY KEY (repository, number),
            FOREIGN KEY (repository) REFERENCES repositories(name)
        );

        CREATE TABLE content_units (
            id              INTEGER PRIMARY KEY,
            kind            TEXT NOT NULL,
            name            TEXT NOT NULL,
            version         TEXT NOT NULL,
            attributes_json TEXT NOT NULL DEFAULT '{}',
            UNIQUE (kind, name, version)
        );

        CREATE TABLE repository_content (
            repository      TEXT NOT NULL,
            unit_id         INTEGER NOT NULL,
            version_added   INTEGER NOT NULL,
            version_removed INTEGER,
            FOREIGN KEY (repository) REFERENCES repositories(name),
            FOREIGN KEY (unit_id) REFERENCES content_units(id)
        );

        CREATE INDEX idx_repository_content_unit ON repository_content(repository, unit_id);
        CREATE INDEX idx_repository_content_added ON repository_content(repository, version_added);
        CREATE INDEX idx_content_units_name ON content_units(name);",
    )])
}
