use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::BackfillArgs;
use crate::commands::{load_batches, load_engine};
use crate::inference::{BackfillSummary, LegacyIdentityInferencer};
use crate::model::{CustomSurvey, SurveyFile};
use crate::resolver::QuestionResolver;
use crate::store::{DB_SCHEMA_VERSION, SqliteLinkStore};
use crate::util::{
    ensure_directory, now_utc_string, read_json, utc_compact_string, write_json_pretty,
};

#[derive(Debug, Clone, Serialize)]
pub struct BackfillPaths {
    pub batches_path: String,
    pub surveys_path: Option<String>,
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub dry_run: bool,
    pub catalog_sha256: String,
    pub paths: BackfillPaths,
    pub survey_count: usize,
    pub summary: BackfillSummary,
}

pub fn run(args: BackfillArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("backfill-{}", utc_compact_string(started_ts));

    let engine = load_engine(&args.engine)?;
    let batches = load_batches(&args.batches_path)?;
    let surveys = match &args.surveys_path {
        Some(path) => read_json::<SurveyFile>(path)?.surveys,
        None => Vec::<CustomSurvey>::new(),
    };

    let db_path = args.resolved_db_path();
    info!(
        run_id = %run_id,
        batches = batches.len(),
        surveys = surveys.len(),
        db_path = %db_path.display(),
        dry_run = args.dry_run,
        "starting legacy identity backfill"
    );

    let mut store = open_link_store(&db_path, args.dry_run)?;

    let resolver =
        QuestionResolver::new(&engine.loaded.registry, engine.config.heuristic_prefix_len);
    let inferencer = LegacyIdentityInferencer::new(resolver, &engine.config)?;
    let summary = inferencer.backfill(&mut store, &batches, &surveys, args.dry_run);

    let status = if summary.failed == 0 {
        "completed"
    } else {
        warn!(
            failed = summary.failed,
            failed_batch_ids = ?summary.failed_batch_ids,
            "some batches could not be linked; rerun to retry them"
        );
        "completed_with_failures"
    };

    let manifest = BackfillRunManifest {
        manifest_version: 1,
        run_id,
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        started_at,
        updated_at: now_utc_string(),
        dry_run: args.dry_run,
        catalog_sha256: engine.loaded.sha256.clone(),
        paths: BackfillPaths {
            batches_path: args.batches_path.display().to_string(),
            surveys_path: args
                .surveys_path
                .as_ref()
                .map(|path| path.display().to_string()),
            db_path: db_path.display().to_string(),
        },
        survey_count: surveys.len(),
        summary,
    };

    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        args.cache_root.join("manifests").join(format!(
            "backfill_run_{}.json",
            utc_compact_string(started_ts)
        ))
    });
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote backfill run manifest");
    info!(
        inferred = manifest.summary.inferred,
        skipped = manifest.summary.skipped,
        failed = manifest.summary.failed,
        status = %manifest.status,
        "backfill completed"
    );

    Ok(())
}

/// Dry runs never write to disk: an existing database is opened read-only
/// and a missing one is stood in for by an empty in-memory store.
fn open_link_store(db_path: &Path, dry_run: bool) -> Result<SqliteLinkStore> {
    if dry_run {
        return if db_path.exists() {
            SqliteLinkStore::open_read_only(db_path)
        } else {
            SqliteLinkStore::open_in_memory()
        };
    }

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_directory(parent)?;
    }
    SqliteLinkStore::open(db_path)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::inference::LinkStore;
    use crate::model::{LinkMethod, SurveyIdentityLink};

    #[test]
    fn dry_run_store_does_not_modify_an_existing_database() {
        let dir = std::env::temp_dir().join(format!(
            "sel-quality-backfill-{}-{}",
            std::process::id(),
            utc_compact_string(Utc::now())
        ));
        fs::create_dir_all(&dir).unwrap();
        let db_path = dir.join("links.sqlite");
        SqliteLinkStore::open(&db_path).unwrap();
        let before = fs::read(&db_path).unwrap();

        let mut store = open_link_store(&db_path, true).unwrap();
        let link = SurveyIdentityLink {
            answer_batch_id: "b1".to_string(),
            inferred_survey_id: "unknown".to_string(),
            method: LinkMethod::FallbackDefault,
            overlap_ratio: None,
        };
        assert!(store.existing_link("b1").unwrap().is_none());
        assert!(store.persist_link(&link).is_err());
        drop(store);

        assert_eq!(fs::read(&db_path).unwrap(), before);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn dry_run_without_a_database_creates_no_file() {
        let db_path = std::env::temp_dir().join(format!(
            "sel-quality-missing-{}-{}.sqlite",
            std::process::id(),
            utc_compact_string(Utc::now())
        ));

        let store = open_link_store(&db_path, true).unwrap();
        assert_eq!(store.link_count().unwrap(), 0);
        assert!(!db_path.exists());
    }
}
