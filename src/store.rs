use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use crate::inference::LinkStore;
use crate::model::{LinkMethod, SurveyIdentityLink};
use crate::util::now_utc_string;

pub const DB_SCHEMA_VERSION: &str = "0.1.0";

/// Write-once SQLite table of inferred survey links.
pub struct SqliteLinkStore {
    connection: Connection,
}

impl SqliteLinkStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        configure_connection(&connection)?;
        Self::with_connection(connection)
    }

    /// Opens an existing database without touching its schema, pragmas or
    /// metadata. Writes through this handle fail.
    pub fn open_read_only(db_path: &Path) -> Result<Self> {
        let connection = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open {} read-only", db_path.display()))?;
        Ok(Self { connection })
    }

    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::with_connection(connection)
    }

    fn with_connection(connection: Connection) -> Result<Self> {
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    pub fn link_count(&self) -> Result<i64> {
        let count = self
            .connection
            .query_row("SELECT COUNT(*) FROM survey_links", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn counts_by_method(&self) -> Result<BTreeMap<LinkMethod, i64>> {
        let mut statement = self.connection.prepare(
            "
            SELECT method, COUNT(*)
            FROM survey_links
            GROUP BY method
            ORDER BY method ASC
            ",
        )?;

        let mut rows = statement.query([])?;
        let mut out = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            let Some(method) = LinkMethod::parse(&raw) else {
                bail!("unknown link method in survey_links: {raw}");
            };
            out.insert(method, row.get(1)?);
        }

        Ok(out)
    }

    pub fn schema_version(&self) -> Option<String> {
        self.connection
            .query_row(
                "SELECT value FROM metadata WHERE key = 'db_schema_version' LIMIT 1",
                [],
                |row| row.get::<_, String>(0),
            )
            .ok()
    }
}

impl LinkStore for SqliteLinkStore {
    fn existing_link(&self, answer_batch_id: &str) -> Result<Option<SurveyIdentityLink>> {
        let row = self
            .connection
            .query_row(
                "
                SELECT answer_batch_id, inferred_survey_id, method, overlap_ratio
                FROM survey_links
                WHERE answer_batch_id = ?1
                ",
                [answer_batch_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                    ))
                },
            )
            .optional()
            .with_context(|| format!("failed to read link for batch {answer_batch_id}"))?;

        let Some((answer_batch_id, inferred_survey_id, method, overlap_ratio)) = row else {
            return Ok(None);
        };
        let Some(method) = LinkMethod::parse(&method) else {
            bail!("unknown link method {method} for batch {answer_batch_id}");
        };

        Ok(Some(SurveyIdentityLink {
            answer_batch_id,
            inferred_survey_id,
            method,
            overlap_ratio,
        }))
    }

    fn persist_link(&mut self, link: &SurveyIdentityLink) -> Result<bool> {
        let inserted = self
            .connection
            .execute(
                "
                INSERT INTO survey_links(answer_batch_id, inferred_survey_id, method, overlap_ratio, inferred_at)
                VALUES(?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(answer_batch_id) DO NOTHING
                ",
                params![
                    link.answer_batch_id,
                    link.inferred_survey_id,
                    link.method.as_str(),
                    link.overlap_ratio,
                    now_utc_string(),
                ],
            )
            .with_context(|| format!("failed to persist link for batch {}", link.answer_batch_id))?;

        Ok(inserted == 1)
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS survey_links (
              answer_batch_id TEXT PRIMARY KEY,
              inferred_survey_id TEXT NOT NULL,
              method TEXT NOT NULL,
              overlap_ratio REAL,
              inferred_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_survey_links_survey ON survey_links(inferred_survey_id);
            ",
        )
        .context("failed to initialize link store schema")?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::utc_compact_string;

    fn link(
        batch_id: &str,
        survey_id: &str,
        method: LinkMethod,
        ratio: Option<f64>,
    ) -> SurveyIdentityLink {
        SurveyIdentityLink {
            answer_batch_id: batch_id.to_string(),
            inferred_survey_id: survey_id.to_string(),
            method,
            overlap_ratio: ratio,
        }
    }

    #[test]
    fn persisted_links_round_trip_through_sqlite() {
        let mut store = SqliteLinkStore::open_in_memory().unwrap();
        let stored = link("b1", "custom-1", LinkMethod::OverlapMatch, Some(0.875));

        assert!(store.persist_link(&stored).unwrap());
        assert_eq!(store.existing_link("b1").unwrap(), Some(stored));
        assert_eq!(store.existing_link("missing").unwrap(), None);
        assert_eq!(store.schema_version().as_deref(), Some(DB_SCHEMA_VERSION));
    }

    #[test]
    fn second_write_for_a_batch_is_ignored() {
        let mut store = SqliteLinkStore::open_in_memory().unwrap();
        let original = link("b1", "builtin-daily", LinkMethod::TemplatePattern, None);
        let replacement = link("b1", "legacy-daily", LinkMethod::FallbackDefault, None);

        assert!(store.persist_link(&original).unwrap());
        assert!(!store.persist_link(&replacement).unwrap());
        assert_eq!(
            store.existing_link("b1").unwrap().unwrap().inferred_survey_id,
            "builtin-daily"
        );
        assert_eq!(store.link_count().unwrap(), 1);
    }

    #[test]
    fn counts_group_by_method() {
        let mut store = SqliteLinkStore::open_in_memory().unwrap();
        store
            .persist_link(&link("b1", "builtin-daily", LinkMethod::TemplatePattern, None))
            .unwrap();
        store
            .persist_link(&link("b2", "builtin-daily", LinkMethod::TemplatePattern, None))
            .unwrap();
        store
            .persist_link(&link("b3", "unknown", LinkMethod::FallbackDefault, None))
            .unwrap();

        let counts = store.counts_by_method().unwrap();
        assert_eq!(counts[&LinkMethod::TemplatePattern], 2);
        assert_eq!(counts[&LinkMethod::FallbackDefault], 1);
        assert!(!counts.contains_key(&LinkMethod::OverlapMatch));
    }

    #[test]
    fn read_only_open_leaves_the_file_untouched() {
        let dir = std::env::temp_dir().join(format!(
            "sel-quality-store-{}-{}",
            std::process::id(),
            utc_compact_string(chrono::Utc::now())
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let db_path = dir.join("links.sqlite");

        {
            let mut store = SqliteLinkStore::open(&db_path).unwrap();
            store
                .persist_link(&link("b1", "builtin-daily", LinkMethod::TemplatePattern, None))
                .unwrap();
            store
                .connection
                .execute(
                    "UPDATE metadata SET value = 'older' WHERE key = 'db_schema_version'",
                    [],
                )
                .unwrap();
        }

        let mut reader = SqliteLinkStore::open_read_only(&db_path).unwrap();
        assert_eq!(reader.schema_version().as_deref(), Some("older"));
        assert_eq!(reader.link_count().unwrap(), 1);
        assert!(reader.existing_link("b1").unwrap().is_some());
        assert!(
            reader
                .persist_link(&link("b2", "unknown", LinkMethod::FallbackDefault, None))
                .is_err()
        );
        drop(reader);

        let reopened = SqliteLinkStore::open_read_only(&db_path).unwrap();
        assert_eq!(reopened.link_count().unwrap(), 1);
        drop(reopened);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
