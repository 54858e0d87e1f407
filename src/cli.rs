use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "sel-quality",
    version,
    about = "Question resolution and data-quality tooling for SEL survey answers"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a template catalog and write its manifest.
    Catalog(CatalogArgs),
    /// Resolve every answer in a batch file to its question template.
    Resolve(ResolveArgs),
    /// Compute per-batch data-quality reports.
    Diagnose(DiagnoseArgs),
    /// Infer and persist survey links for legacy answer batches.
    Backfill(BackfillArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Template catalog JSON; the built-in catalog is used when omitted.
    #[arg(long)]
    pub catalog_path: Option<PathBuf>,

    #[arg(long)]
    pub config_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CatalogArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    #[arg(long, default_value = ".cache/sel-quality")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    #[arg(long)]
    pub batches_path: PathBuf,

    #[arg(long = "batch-id")]
    pub batch_ids: Vec<String>,

    #[arg(long)]
    pub output_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub only_needs_review: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DiagnoseArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    #[arg(long)]
    pub batches_path: PathBuf,

    #[arg(long, default_value = ".cache/sel-quality")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct BackfillArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    #[arg(long)]
    pub batches_path: PathBuf,

    #[arg(long)]
    pub surveys_path: Option<PathBuf>,

    #[arg(long, default_value = ".cache/sel-quality")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/sel-quality")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

impl StatusArgs {
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.cache_root.join(DEFAULT_DB_FILENAME))
    }
}

impl BackfillArgs {
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.cache_root.join(DEFAULT_DB_FILENAME))
    }
}

pub const DEFAULT_DB_FILENAME: &str = "sel_links.sqlite";
