use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, UNKNOWN_SURVEY_ID};
use crate::model::{
    CustomSurvey, LegacyAnswerBatch, LinkMethod, SurveyIdentityLink, normalize_question_id,
};
use crate::resolver::QuestionResolver;


/// Persistence seam for inferred links. Implementations must never replace
/// a link that is already stored.
pub trait LinkStore {
    fn existing_link(&self, answer_batch_id: &str) -> Result<Option<SurveyIdentityLink>>;

    /// Returns `false` when a link for the batch already existed.
    fn persist_link(&mut self, link: &SurveyIdentityLink) -> Result<bool>;
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct BackfillSummary {
    pub batches_seen: usize,
    pub inferred: usize,
    pub skipped: usize,
    pub failed: usize,
    pub by_method: BTreeMap<LinkMethod, usize>,
    pub failed_batch_ids: Vec<String>,
    pub links: Vec<SurveyIdentityLink>,
}

#[derive(Debug, Clone)]
pub struct LegacyIdentityInferencer<'a> {
    resolver: QuestionResolver<'a>,
    template_id_pattern: Regex,
    overlap_threshold: f64,
    builtin_survey_prefix: String,
    fallback_survey_prefix: String,
}

impl<'a> LegacyIdentityInferencer<'a> {
    pub fn new(resolver: QuestionResolver<'a>, config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            resolver,
            template_id_pattern: config.compile_template_id_pattern()?,
            overlap_threshold: config.overlap_threshold,
            builtin_survey_prefix: config.builtin_survey_prefix.clone(),
            fallback_survey_prefix: config.fallback_survey_prefix.clone(),
        })
    }

    /// Infers a link for one batch without touching storage.
    pub fn infer(
        &self,
        batch: &LegacyAnswerBatch,
        surveys: &[CustomSurvey],
    ) -> SurveyIdentityLink {
        let ids = batch.unique_question_ids();
        let survey_type = normalized_survey_type(batch.survey_type.as_deref());

        if !ids.is_empty() && self.all_template_shaped(batch) {
            return SurveyIdentityLink {
                answer_batch_id: batch.batch_id.clone(),
                inferred_survey_id: format!(
                    "{}-{}",
                    self.builtin_survey_prefix,
                    survey_type.as_deref().unwrap_or(UNKNOWN_SURVEY_ID)
                ),
                method: LinkMethod::TemplatePattern,
                overlap_ratio: None,
            };
        }

        if let Some((survey, ratio)) = best_overlap(&ids, surveys)
            && ratio >= self.overlap_threshold
        {
            return SurveyIdentityLink {
                answer_batch_id: batch.batch_id.clone(),
                inferred_survey_id: survey.id.clone(),
                method: LinkMethod::OverlapMatch,
                overlap_ratio: Some(ratio),
            };
        }

        let inferred_survey_id = match survey_type {
            Some(tag) => format!("{}-{tag}", self.fallback_survey_prefix),
            None => UNKNOWN_SURVEY_ID.to_string(),
        };
        SurveyIdentityLink {
            answer_batch_id: batch.batch_id.clone(),
            inferred_survey_id,
            method: LinkMethod::FallbackDefault,
            overlap_ratio: None,
        }
    }

    /// Links every batch that has no link yet. A storage failure on one batch
    /// is logged and counted; the run always continues with the next batch.
    pub fn backfill<S: LinkStore>(
        &self,
        store: &mut S,
        batches: &[LegacyAnswerBatch],
        surveys: &[CustomSurvey],
        dry_run: bool,
    ) -> BackfillSummary {
        let mut summary = BackfillSummary::default();

        for batch in batches {
            summary.batches_seen += 1;

            if batch.survey_id.is_some() {
                debug!(batch_id = %batch.batch_id, "batch carries an explicit survey id");
                summary.skipped += 1;
                continue;
            }

            match store.existing_link(&batch.batch_id) {
                Ok(Some(existing)) => {
                    debug!(
                        batch_id = %batch.batch_id,
                        survey_id = %existing.inferred_survey_id,
                        "batch already linked"
                    );
                    summary.skipped += 1;
                    continue;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(batch_id = %batch.batch_id, error = %err, "failed to read existing link");
                    summary.failed += 1;
                    summary.failed_batch_ids.push(batch.batch_id.clone());
                    continue;
                }
            }

            let link = self.infer(batch, surveys);

            if !dry_run {
                match store.persist_link(&link) {
                    Ok(true) => {}
                    Ok(false) => {
                        summary.skipped += 1;
                        continue;
                    }
                    Err(err) => {
                        warn!(batch_id = %batch.batch_id, error = %err, "failed to persist link");
                        summary.failed += 1;
                        summary.failed_batch_ids.push(batch.batch_id.clone());
                        continue;
                    }
                }
            }

            debug!(
                batch_id = %link.answer_batch_id,
                survey_id = %link.inferred_survey_id,
                method = link.method.as_str(),
                "batch linked"
            );
            summary.inferred += 1;
            *summary.by_method.entry(link.method).or_default() += 1;
            summary.links.push(link);
        }

        info!(
            batches = summary.batches_seen,
            inferred = summary.inferred,
            skipped = summary.skipped,
            failed = summary.failed,
            dry_run,
            "legacy identity backfill finished"
        );

        summary
    }

    fn all_template_shaped(&self, batch: &LegacyAnswerBatch) -> bool {
        let mut seen = HashSet::new();
        batch
            .answers
            .iter()
            .map(|answer| (answer.normalized_question_id(), answer))
            .filter(|(id, _)| seen.insert(*id))
            .all(|(id, answer)| {
                self.template_id_pattern.is_match(id)
                    || self
                        .resolver
                        .resolve_exact(id, answer.respondent_grade_band)
                        .is_some()
            })
    }
}

/// Highest `|ids ∩ survey| / |ids|` across `surveys`; the earliest survey wins ties.
/// `ids` are expected normalized, as `LegacyAnswerBatch::unique_question_ids` returns them.
pub fn best_overlap<'s>(
    ids: &[&str],
    surveys: &'s [CustomSurvey],
) -> Option<(&'s CustomSurvey, f64)> {
    if ids.is_empty() {
        return None;
    }

    let mut best: Option<(&CustomSurvey, f64)> = None;
    for survey in surveys {
        let declared = survey
            .question_ids
            .iter()
            .map(|id| normalize_question_id(id))
            .collect::<HashSet<&str>>();
        let shared = ids.iter().filter(|id| declared.contains(**id)).count();
        let ratio = shared as f64 / ids.len() as f64;

        if best.is_none_or(|(_, best_ratio)| ratio > best_ratio) {
            best = Some((survey, ratio));
        }
    }

    best
}

fn normalized_survey_type(tag: Option<&str>) -> Option<String> {
    tag.map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
}
