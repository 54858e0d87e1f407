use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::info;

use crate::cli::ResolveArgs;
use crate::commands::{load_batches, load_engine};
use crate::model::LegacyAnswerBatch;
use crate::quality::{AnswerMatch, MatchQualityAggregator};
use crate::resolver::QuestionResolver;
use crate::util::write_json_pretty;

#[derive(Debug, Serialize)]
struct ResolvedBatch<'r, 'a> {
    batch_id: &'r str,
    answers: Vec<AnswerMatch<'r, 'a>>,
}

pub fn run(args: ResolveArgs) -> Result<()> {
    let engine = load_engine(&args.engine)?;
    let batches = load_batches(&args.batches_path)?;
    let selected = select_batches(&batches, &args.batch_ids)?;

    let resolver =
        QuestionResolver::new(&engine.loaded.registry, engine.config.heuristic_prefix_len);
    let aggregator =
        MatchQualityAggregator::new(resolver, engine.config.quality_thresholds.clone());

    let mut resolved = Vec::with_capacity(selected.len());
    let mut needs_review = 0_usize;
    for batch in selected {
        let mut answers = aggregator.resolve_answers(&batch.answers);
        needs_review += answers.iter().filter(|answer| answer.needs_review).count();
        if args.only_needs_review {
            answers.retain(|answer| answer.needs_review);
        }
        resolved.push(ResolvedBatch {
            batch_id: &batch.batch_id,
            answers,
        });
    }

    info!(
        batches = resolved.len(),
        needs_review,
        "resolved answer batches"
    );

    match args.output_path {
        Some(path) => {
            write_json_pretty(&path, &resolved)?;
            info!(path = %path.display(), "wrote resolved answers");
        }
        None => {
            let rendered = serde_json::to_string_pretty(&resolved)
                .context("failed to render resolved answers")?;
            println!("{rendered}");
        }
    }

    Ok(())
}

fn select_batches<'b>(
    batches: &'b [LegacyAnswerBatch],
    batch_ids: &[String],
) -> Result<Vec<&'b LegacyAnswerBatch>> {
    if batch_ids.is_empty() {
        return Ok(batches.iter().collect());
    }

    let mut selected = Vec::with_capacity(batch_ids.len());
    for batch_id in batch_ids {
        let Some(batch) = batches.iter().find(|batch| &batch.batch_id == batch_id) else {
            bail!("batch not found: {batch_id}");
        };
        selected.push(batch);
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(batch_id: &str) -> LegacyAnswerBatch {
        LegacyAnswerBatch {
            batch_id: batch_id.to_string(),
            survey_type: None,
            survey_id: None,
            answers: Vec::new(),
        }
    }

    #[test]
    fn select_batches_keeps_requested_order_and_rejects_unknown_ids() {
        let batches = vec![batch("a"), batch("b"), batch("c")];

        let all = select_batches(&batches, &[]).unwrap();
        assert_eq!(all.len(), 3);

        let picked = select_batches(&batches, &["c".to_string(), "a".to_string()]).unwrap();
        let ids = picked
            .iter()
            .map(|batch| batch.batch_id.as_str())
            .collect::<Vec<&str>>();
        assert_eq!(ids, vec!["c", "a"]);

        assert!(select_batches(&batches, &["zzz".to_string()]).is_err());
    }
}
