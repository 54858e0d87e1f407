pub mod backfill;
pub mod catalog;
pub mod diagnose;
pub mod resolve;
pub mod status;

use anyhow::Result;

use crate::cli::EngineArgs;
use crate::config::EngineConfig;
use crate::model::{BatchFile, LegacyAnswerBatch};
use crate::registry::{LoadedRegistry, TemplateRegistry};
use crate::util::read_json;

pub struct Engine {
    pub loaded: LoadedRegistry,
    pub config: EngineConfig,
}

pub fn load_engine(args: &EngineArgs) -> Result<Engine> {
    let config = EngineConfig::load(args.config_path.as_deref())?;
    let loaded = TemplateRegistry::load(args.catalog_path.as_deref())?;
    Ok(Engine { loaded, config })
}

pub fn load_batches(path: &std::path::Path) -> Result<Vec<LegacyAnswerBatch>> {
    let file: BatchFile = read_json(path)?;
    Ok(file.batches)
}
