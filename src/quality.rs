use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::config::QualityThresholds;
use crate::model::{
    AnswerKind, AnswerRecord, MatchResult, MatchTier, QualityLevel, QualityReport, SelDomain,
};
use crate::resolver::QuestionResolver;

pub fn quality_level_for(match_rate: f64, thresholds: &QualityThresholds) -> QualityLevel {
    if match_rate >= thresholds.excellent {
        QualityLevel::Excellent
    } else if match_rate >= thresholds.good {
        QualityLevel::Good
    } else if match_rate >= thresholds.fair {
        QualityLevel::Fair
    } else {
        QualityLevel::Poor
    }
}

/// One answer paired with the resolution of its question id.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerMatch<'r, 'a> {
    pub answer: &'r AnswerRecord,
    #[serde(rename = "match")]
    pub result: MatchResult<'a>,
    pub needs_review: bool,
}

#[derive(Debug, Clone)]
pub struct MatchQualityAggregator<'a> {
    resolver: QuestionResolver<'a>,
    thresholds: QualityThresholds,
}

impl<'a> MatchQualityAggregator<'a> {
    pub fn new(resolver: QuestionResolver<'a>, thresholds: QualityThresholds) -> Self {
        Self {
            resolver,
            thresholds,
        }
    }

    /// Summarizes a batch. `match_rate` is taken over unique question ids,
    /// and an empty batch is reported as a vacuous 1.0.
    pub fn analyze(&self, records: &[AnswerRecord]) -> QualityReport {
        let resolved = self.resolve_unique(records);

        let mut counts_by_tier = MatchTier::ALL
            .iter()
            .map(|tier| (*tier, 0_usize))
            .collect::<BTreeMap<MatchTier, usize>>();
        for (_, result) in &resolved {
            *counts_by_tier.entry(result.tier).or_default() += 1;
        }

        let unique_questions = resolved.len();
        let authoritative =
            counts_by_tier[&MatchTier::Exact] + counts_by_tier[&MatchTier::CrossGrade];
        let match_rate = if unique_questions == 0 {
            1.0
        } else {
            authoritative as f64 / unique_questions as f64
        };

        let mut domain_distribution = SelDomain::ALL
            .iter()
            .map(|domain| (*domain, 0_usize))
            .collect::<BTreeMap<SelDomain, usize>>();
        let mut answer_type_distribution = AnswerKind::ALL
            .iter()
            .map(|kind| (*kind, 0_usize))
            .collect::<BTreeMap<AnswerKind, usize>>();
        for record in records {
            *domain_distribution.entry(record.domain).or_default() += 1;
            *answer_type_distribution
                .entry(record.answer_value.kind())
                .or_default() += 1;
        }

        let unresolved_question_ids = resolved
            .iter()
            .filter(|(_, result)| result.tier == MatchTier::Unresolved)
            .map(|(id, _)| (*id).to_string())
            .collect();

        QualityReport {
            total_answers: records.len(),
            unique_questions,
            counts_by_tier,
            match_rate,
            domain_distribution,
            answer_type_distribution,
            quality_level: quality_level_for(match_rate, &self.thresholds),
            unresolved_question_ids,
        }
    }

    /// Per-answer matches in input order, each id resolved once.
    pub fn resolve_answers<'r>(&self, records: &'r [AnswerRecord]) -> Vec<AnswerMatch<'r, 'a>> {
        let memo = self
            .resolve_unique(records)
            .into_iter()
            .collect::<HashMap<&str, MatchResult<'a>>>();

        records
            .iter()
            .map(|record| {
                let result = memo
                    .get(record.normalized_question_id())
                    .cloned()
                    .unwrap_or_else(|| MatchResult::unresolved(&record.question_id));
                AnswerMatch {
                    answer: record,
                    needs_review: result.needs_review(),
                    result,
                }
            })
            .collect()
    }

    /// Resolves each distinct normalized question id once, in first-seen
    /// order. A repeated id keeps the grade band of its first occurrence.
    fn resolve_unique<'r>(&self, records: &'r [AnswerRecord]) -> Vec<(&'r str, MatchResult<'a>)> {
        let mut seen = HashSet::<&str>::new();
        let mut resolved = Vec::new();

        for record in records {
            let id = record.normalized_question_id();
            if !seen.insert(id) {
                continue;
            }
            resolved.push((id, self.resolver.resolve(id, record.respondent_grade_band)));
        }

        resolved
    }
}
