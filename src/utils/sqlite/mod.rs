// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//!
//! Ported from <https://github.com/filecoin-project/lotus/blob/v1.34.3/lib/sqlite/sqlite.go>
//!

use anyhow::Context as _;
use sqlx::{
    SqlitePool,
    query::Query,
    sqlite::{
        SqliteArguments, SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode,
        SqlitePoolOptions, SqliteSynchronous,
    },
};
use std::{cmp::Ordering, path::Path};

pub type SqliteQuery<'q> = Query<'q, sqlx::Sqlite, SqliteArguments<'q>>;

/// Opens or creates a database at the specified path
pub async fn open_file(file: &Path) -> anyhow::Result<SqlitePool> {
    if let Some(dir) = file.parent()
        && !dir.is_dir()
    {
        std::fs::create_dir_all(dir)?;
    }
    let options = SqliteConnectOptions::new()
        .filename(file)
        .create_if_missing(true);
    Ok(open(options).await?)
}

/// Opens a private in-memory database. The pool is capped to a single
/// connection that never retires, since an in-memory database only lives as
/// long as the connection holding it.
pub async fn open_memory() -> sqlx::Result<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(SqliteConnectOptions::new().in_memory(true))
        .await
}

/// Opens a database with the given options. If the database does not exist, it
/// will be created.
pub async fn open(options: SqliteConnectOptions) -> sqlx::Result<SqlitePool> {
    let options = options
        .synchronous(SqliteSynchronous::Normal)
        .pragma("temp_store", "memory")
        .auto_vacuum(SqliteAutoVacuum::None)
        .journal_mode(SqliteJournalMode::Wal)
        .pragma("journal_size_limit", "0") // always reset journal and wal files
        .foreign_keys(true)
        .read_only(false);
    SqlitePool::connect_with(options).await
}

/// This function initializes the database by checking whether it needs to be created or upgraded.
/// The `ddls` are the `DDL`(Data Definition Language) statements to create the tables in the
/// database and their initial required content. The schema version of a fresh database is
/// `version_migrations.len() + 1`; an existing database is migrated forward one version at a time
/// until it reaches that number.
/// It is up to the caller to close the database if an error is returned by this function.
pub async fn init_db<'q>(
    db: &SqlitePool,
    name: &str,
    ddls: impl IntoIterator<Item = SqliteQuery<'q>>,
    version_migrations: Vec<SqliteQuery<'q>>,
) -> anyhow::Result<()> {
    let schema_version = version_migrations.len() + 1;

    let init = async |db: &SqlitePool, schema_version| {
        let mut tx = db.begin().await?;
        sqlx::query("CREATE TABLE IF NOT EXISTS _meta (version UINT64 NOT NULL UNIQUE)")
            .execute(tx.as_mut())
            .await?;
        for i in 1..=schema_version {
            sqlx::query("INSERT OR IGNORE INTO _meta (version) VALUES (?)")
                .bind(i as i64)
                .execute(tx.as_mut())
                .await?;
        }
        for ddl in ddls.into_iter() {
            ddl.execute(tx.as_mut()).await?;
        }
        tx.commit().await
    };

    if sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_meta';")
        .fetch_optional(db)
        .await
        .map_err(|e| anyhow::anyhow!("error looking for {name} database _meta table: {e}"))?
        .is_none()
    {
        init(db, schema_version).await?;
    }

    let found_version: u64 = sqlx::query_scalar("SELECT max(version) FROM _meta")
        .fetch_optional(db)
        .await?
        .with_context(|| format!("invalid {name} database version: no version found"))?;
    anyhow::ensure!(found_version > 0, "schema version should be 1 based");

    match found_version.cmp(&(schema_version as _)) {
        Ordering::Greater => {
            anyhow::bail!(
                "invalid {name} database version: version {found_version} is greater than the number of migrations {schema_version}"
            );
        }
        Ordering::Equal | Ordering::Less => {}
    }

    // run a migration for each version that we have not yet applied, where `found_version` is what
    // is currently in the database and `schema_version` is the target version. If they are the
    // same, nothing is run.
    for (from_version, to_version, migration) in version_migrations
        .into_iter()
        .enumerate()
        .map(|(i, m)| (i + 1, i + 2, m))
        // versions start at 1, but the migrations are 0-indexed where the first migration would
        // take us to version 2
        .skip(found_version as usize - 1)
    {
        tracing::info!("migrating {name} database from version {from_version} to {to_version}");
        let mut tx = db.begin().await?;
        migration.execute(tx.as_mut()).await?;
        sqlx::query("INSERT OR IGNORE INTO _meta (version) VALUES (?)")
            .bind(to_version as i64)
            .execute(tx.as_mut())
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DDL: &str = "CREATE TABLE IF NOT EXISTS widget (id INTEGER PRIMARY KEY, name TEXT)";

    #[tokio::test]
    async fn init_fresh_database_records_schema_version() {
        let db = open_memory().await.unwrap();
        init_db(&db, "test", [sqlx::query(DDL)], vec![]).await.unwrap();

        let version: i64 = sqlx::query_scalar("SELECT max(version) FROM _meta")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(version, 1);

        // re-init on an up-to-date database is a no-op
        init_db(&db, "test", [sqlx::query(DDL)], vec![]).await.unwrap();
    }

    #[tokio::test]
    async fn migrations_apply_in_order() {
        let db = open_memory().await.unwrap();
        init_db(&db, "test", [sqlx::query(DDL)], vec![]).await.unwrap();

        // same database, one migration behind the new schema
        init_db(
            &db,
            "test",
            [sqlx::query(DDL)],
            vec![sqlx::query("ALTER TABLE widget ADD COLUMN weight INTEGER")],
        )
        .await
        .unwrap();

        let version: i64 = sqlx::query_scalar("SELECT max(version) FROM _meta")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(version, 2);

        sqlx::query("INSERT INTO widget (name, weight) VALUES ('a', 1)")
            .execute(&db)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn version_ahead_of_migrations_is_an_error() {
        let db = open_memory().await.unwrap();
        init_db(
            &db,
            "test",
            [sqlx::query(DDL)],
            vec![sqlx::query("ALTER TABLE widget ADD COLUMN weight INTEGER")],
        )
        .await
        .unwrap();

        // a build with fewer migrations than the database has seen must refuse to open it
        assert!(init_db(&db, "test", [sqlx::query(DDL)], vec![]).await.is_err());
    }

    #[tokio::test]
    async fn open_file_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.db");
        let db = open_file(&path).await.unwrap();
        init_db(&db, "test", [sqlx::query(DDL)], vec![]).await.unwrap();
        assert!(path.exists());
    }
}
