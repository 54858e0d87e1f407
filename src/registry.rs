use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::info;

use crate::model::{GradeBand, TemplateCatalog, TemplateSet};
use crate::util::sha256_bytes;

const DEFAULT_CATALOG_JSON: &str = include_str!("../data/default_templates.json");
pub const DEFAULT_CATALOG_SOURCE: &str = "builtin:default_templates.json";

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum RegistryError {
    #[error("configuration error: no template sets registered")]
    Empty,
    #[error("configuration error: no template set registered for grade band {0}")]
    MissingGradeBand(GradeBand),
    #[error("configuration error: more than one template set registered for grade band {0}")]
    DuplicateGradeBand(GradeBand),
    #[error("configuration error: duplicate template set id {0}")]
    DuplicateSetId(String),
    #[error("configuration error: duplicate template id {template_id} in set {set_id}")]
    DuplicateTemplateId { set_id: String, template_id: String },
}

/// Read-only catalog of template sets, kept in registration order.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    sets: Vec<TemplateSet>,
}

#[derive(Debug, Clone)]
pub struct LoadedRegistry {
    pub registry: TemplateRegistry,
    pub source: String,
    pub sha256: String,
}

impl TemplateRegistry {
    pub fn new(sets: Vec<TemplateSet>) -> Result<Self, RegistryError> {
        if sets.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut bands = HashSet::new();
        let mut set_ids = HashSet::new();
        for set in &sets {
            if !bands.insert(set.grade_band) {
                return Err(RegistryError::DuplicateGradeBand(set.grade_band));
            }
            if !set_ids.insert(set.id.as_str()) {
                return Err(RegistryError::DuplicateSetId(set.id.clone()));
            }

            let mut template_ids = HashSet::new();
            for template in &set.templates {
                if !template_ids.insert(template.id.as_str()) {
                    return Err(RegistryError::DuplicateTemplateId {
                        set_id: set.id.clone(),
                        template_id: template.id.clone(),
                    });
                }
            }
        }

        Ok(Self { sets })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let catalog: TemplateCatalog =
            serde_json::from_str(raw).context("failed to parse template catalog")?;
        Ok(Self::new(catalog.template_sets)?)
    }

    pub fn builtin() -> Result<Self> {
        Self::from_json(DEFAULT_CATALOG_JSON).context("built-in template catalog is invalid")
    }

    /// Loads the catalog file when given, the built-in catalog otherwise.
    pub fn load(path: Option<&Path>) -> Result<LoadedRegistry> {
        let loaded = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let registry = Self::from_json(&raw)
                    .with_context(|| format!("invalid template catalog: {}", path.display()))?;
                LoadedRegistry {
                    registry,
                    source: path.display().to_string(),
                    sha256: sha256_bytes(raw.as_bytes()),
                }
            }
            None => LoadedRegistry {
                registry: Self::builtin()?,
                source: DEFAULT_CATALOG_SOURCE.to_string(),
                sha256: sha256_bytes(DEFAULT_CATALOG_JSON.as_bytes()),
            },
        };

        info!(
            source = %loaded.source,
            sets = loaded.registry.sets.len(),
            templates = loaded.registry.template_count(),
            "template registry loaded"
        );

        Ok(loaded)
    }

    pub fn primary_set_for(&self, grade_band: GradeBand) -> Result<&TemplateSet, RegistryError> {
        self.sets
            .iter()
            .find(|set| set.grade_band == grade_band)
            .ok_or(RegistryError::MissingGradeBand(grade_band))
    }

    pub fn all_sets_in_registration_order(&self) -> impl Iterator<Item = &TemplateSet> {
        self.sets.iter()
    }

    pub fn template_count(&self) -> usize {
        self.sets.iter().map(|set| set.templates.len()).sum()
    }
}
