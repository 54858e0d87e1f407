use std::collections::BTreeMap;

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::CatalogArgs;
use crate::commands::load_engine;
use crate::model::{ResponseType, SelDomain};
use crate::registry::LoadedRegistry;
use crate::util::{now_utc_string, write_json_pretty};

#[derive(Debug, Clone, Serialize)]
pub struct CatalogSetEntry {
    pub id: String,
    pub grade_band: String,
    pub template_count: usize,
    pub domains: BTreeMap<SelDomain, usize>,
    pub response_types: BTreeMap<ResponseType, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source: String,
    pub sha256: String,
    pub set_count: usize,
    pub template_count: usize,
    pub sets: Vec<CatalogSetEntry>,
    pub warnings: Vec<String>,
}

pub fn run(args: CatalogArgs) -> Result<()> {
    let engine = load_engine(&args.engine)?;
    let pattern = engine.config.compile_template_id_pattern()?;
    let manifest = build_manifest(&engine.loaded, &pattern);

    for warning in &manifest.warnings {
        warn!(warning = %warning, "catalog warning");
    }

    if args.dry_run {
        info!(
            sets = manifest.set_count,
            templates = manifest.template_count,
            warnings = manifest.warnings.len(),
            "catalog dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args
        .manifest_path
        .unwrap_or_else(|| args.cache_root.join("manifests").join("template_catalog.json"));

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote catalog manifest");
    info!(
        sets = manifest.set_count,
        templates = manifest.template_count,
        "catalog check completed"
    );

    Ok(())
}

pub fn build_manifest(loaded: &LoadedRegistry, template_id_pattern: &Regex) -> CatalogManifest {
    let mut sets = Vec::new();
    let mut warnings = Vec::new();

    for set in loaded.registry.all_sets_in_registration_order() {
        let mut domains = BTreeMap::new();
        let mut response_types = BTreeMap::new();

        for template in &set.templates {
            *domains.entry(template.domain).or_insert(0) += 1;
            *response_types.entry(template.response_type).or_insert(0) += 1;

            let label = format!("{}/{}", set.id, template.id);
            if template.grade_band != set.grade_band {
                warnings.push(format!(
                    "{label}: template grade band {} differs from set grade band {}",
                    template.grade_band, set.grade_band
                ));
            }
            if template.domain == SelDomain::Unrecognized {
                warnings.push(format!("{label}: unrecognized domain"));
            }
            if template.response_type == ResponseType::Unrecognized {
                warnings.push(format!("{label}: unrecognized response type"));
            }
            if template.response_type.uses_choice_options() && template.choice_options.is_empty() {
                warnings.push(format!(
                    "{label}: {} template has no choice options",
                    template.response_type.as_str()
                ));
            }
            if template.response_type == ResponseType::NumericScale
                && template.scale_labels.is_none()
            {
                warnings.push(format!("{label}: numeric-scale template has no scale labels"));
            }
            if template.analysis_weight == 0 {
                warnings.push(format!("{label}: analysis weight must be positive"));
            }
            if !template_id_pattern.is_match(&template.id) {
                warnings.push(format!(
                    "{label}: id does not match the built-in id pattern; legacy inference will rely on exact lookup"
                ));
            }
        }

        sets.push(CatalogSetEntry {
            id: set.id.clone(),
            grade_band: set.grade_band.as_str().to_string(),
            template_count: set.templates.len(),
            domains,
            response_types,
        });
    }

    CatalogManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source: loaded.source.clone(),
        sha256: loaded.sha256.clone(),
        set_count: sets.len(),
        template_count: loaded.registry.template_count(),
        sets,
        warnings,
    }
}
