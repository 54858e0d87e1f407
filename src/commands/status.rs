use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::LinkMethod;
use crate::store::SqliteLinkStore;

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.cache_root.join("manifests");
    let db_path = args.resolved_db_path();

    info!(cache_root = %args.cache_root.display(), "status requested");

    if manifest_dir.exists() {
        let mut manifests = fs::read_dir(&manifest_dir)
            .with_context(|| format!("failed to read {}", manifest_dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".json"))
            .collect::<Vec<String>>();
        manifests.sort();

        info!(
            path = %manifest_dir.display(),
            count = manifests.len(),
            latest = %manifests.last().cloned().unwrap_or_default(),
            "manifest directory"
        );
    } else {
        warn!(path = %manifest_dir.display(), "manifest directory missing");
    }

    if db_path.exists() {
        let store = SqliteLinkStore::open_read_only(&db_path)?;
        let links = store.link_count().unwrap_or(0);
        let by_method = store.counts_by_method().unwrap_or_default();
        let count_for = |method: LinkMethod| by_method.get(&method).copied().unwrap_or(0);

        info!(
            path = %db_path.display(),
            schema_version = %store.schema_version().unwrap_or_default(),
            links,
            template_pattern = count_for(LinkMethod::TemplatePattern),
            overlap_match = count_for(LinkMethod::OverlapMatch),
            fallback_default = count_for(LinkMethod::FallbackDefault),
            "link store status"
        );
    } else {
        warn!(path = %db_path.display(), "link store missing");
    }

    Ok(())
}
