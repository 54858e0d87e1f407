use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::DiagnoseArgs;
use crate::commands::{load_batches, load_engine};
use crate::config::EngineConfig;
use crate::model::{AnswerRecord, LegacyAnswerBatch, MatchTier, QualityReport};
use crate::quality::MatchQualityAggregator;
use crate::resolver::QuestionResolver;
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

#[derive(Debug, Clone, Serialize)]
pub struct BatchDiagnostic {
    pub batch_id: String,
    pub survey_type: Option<String>,
    pub advisory: bool,
    pub report: QualityReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub catalog_source: String,
    pub catalog_sha256: String,
    pub config: EngineConfig,
    pub overall: QualityReport,
    pub batches: Vec<BatchDiagnostic>,
    pub advisory_batch_ids: Vec<String>,
}

pub fn run(args: DiagnoseArgs) -> Result<()> {
    let started_ts = Utc::now();
    let run_id = format!("diagnose-{}", utc_compact_string(started_ts));

    let engine = load_engine(&args.engine)?;
    let batches = load_batches(&args.batches_path)?;

    info!(run_id = %run_id, batches = batches.len(), "starting diagnosis");

    let resolver =
        QuestionResolver::new(&engine.loaded.registry, engine.config.heuristic_prefix_len);
    let aggregator =
        MatchQualityAggregator::new(resolver, engine.config.quality_thresholds.clone());
    let (overall, diagnostics) = diagnose_batches(&aggregator, &batches);

    for diagnostic in &diagnostics {
        let report = &diagnostic.report;
        if diagnostic.advisory {
            warn!(
                batch_id = %diagnostic.batch_id,
                match_rate = report.match_rate,
                unresolved = report.counts_by_tier[&MatchTier::Unresolved],
                "poor match quality; downstream insights should be treated as advisory"
            );
        } else {
            info!(
                batch_id = %diagnostic.batch_id,
                match_rate = report.match_rate,
                quality = report.quality_level.as_str(),
                "batch diagnosed"
            );
        }
    }

    let advisory_batch_ids = diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.advisory)
        .map(|diagnostic| diagnostic.batch_id.clone())
        .collect::<Vec<String>>();

    let manifest = DiagnosticManifest {
        manifest_version: 1,
        run_id,
        generated_at: now_utc_string(),
        catalog_source: engine.loaded.source.clone(),
        catalog_sha256: engine.loaded.sha256.clone(),
        config: engine.config.clone(),
        overall,
        batches: diagnostics,
        advisory_batch_ids,
    };

    let report_path = args.report_path.unwrap_or_else(|| {
        args.cache_root.join("manifests").join(format!(
            "quality_report_{}.json",
            utc_compact_string(started_ts)
        ))
    });
    write_json_pretty(&report_path, &manifest)?;

    info!(path = %report_path.display(), "wrote quality report");
    info!(
        answers = manifest.overall.total_answers,
        unique_questions = manifest.overall.unique_questions,
        match_rate = manifest.overall.match_rate,
        quality = manifest.overall.quality_level.as_str(),
        advisory_batches = manifest.advisory_batch_ids.len(),
        "diagnosis completed"
    );

    Ok(())
}

pub fn diagnose_batches(
    aggregator: &MatchQualityAggregator<'_>,
    batches: &[LegacyAnswerBatch],
) -> (QualityReport, Vec<BatchDiagnostic>) {
    let diagnostics = batches
        .iter()
        .map(|batch| {
            let report = aggregator.analyze(&batch.answers);
            BatchDiagnostic {
                batch_id: batch.batch_id.clone(),
                survey_type: batch.survey_type.clone(),
                advisory: report.quality_level.is_advisory(),
                report,
            }
        })
        .collect();

    let all_answers = batches
        .iter()
        .flat_map(|batch| batch.answers.iter().cloned())
        .collect::<Vec<AnswerRecord>>();

    (aggregator.analyze(&all_answers), diagnostics)
}
