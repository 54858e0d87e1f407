use crate::config::MIN_HEURISTIC_PREFIX_LEN;
use crate::model::{GradeBand, MatchResult, MatchTier, normalize_question_id};
use crate::registry::TemplateRegistry;

/// Resolves question ids against a registry snapshot through the fixed
/// exact / cross-grade / heuristic / unresolved chain. Within a tier the
/// first hit in registration order wins.
#[derive(Debug, Clone, Copy)]
pub struct QuestionResolver<'a> {
    registry: &'a TemplateRegistry,
    heuristic_prefix_len: usize,
}

impl<'a> QuestionResolver<'a> {
    pub fn new(registry: &'a TemplateRegistry, heuristic_prefix_len: usize) -> Self {
        Self {
            registry,
            heuristic_prefix_len: heuristic_prefix_len.max(MIN_HEURISTIC_PREFIX_LEN),
        }
    }

    pub fn resolve(&self, question_id: &str, grade_band: GradeBand) -> MatchResult<'a> {
        let trimmed = normalize_question_id(question_id);
        if trimmed.is_empty() {
            return MatchResult::unresolved(question_id);
        }

        self.resolve_exact(trimmed, grade_band)
            .or_else(|| self.resolve_heuristic(trimmed))
            .map(|mut result| {
                result.question_id = question_id.to_string();
                result
            })
            .unwrap_or_else(|| MatchResult::unresolved(question_id))
    }

    /// Tiers 1 and 2 only. `None` means the id exists in no registered set.
    pub fn resolve_exact(
        &self,
        question_id: &str,
        grade_band: GradeBand,
    ) -> Option<MatchResult<'a>> {
        let primary = self.registry.primary_set_for(grade_band).ok();

        if let Some(set) = primary
            && let Some(template) = set.find(question_id)
        {
            return Some(MatchResult::matched(
                question_id,
                MatchTier::Exact,
                set,
                template,
            ));
        }

        self.registry
            .all_sets_in_registration_order()
            .filter(|set| primary.is_none_or(|primary| primary.id != set.id))
            .find_map(|set| {
                set.find(question_id).map(|template| {
                    MatchResult::matched(question_id, MatchTier::CrossGrade, set, template)
                })
            })
    }

    fn resolve_heuristic(&self, question_id: &str) -> Option<MatchResult<'a>> {
        let prefix = heuristic_prefix(question_id, self.heuristic_prefix_len)?;

        self.registry
            .all_sets_in_registration_order()
            .find_map(|set| {
                set.templates
                    .iter()
                    .find(|template| shares_alphabetic_prefix(&prefix, &template.id))
                    .map(|template| {
                        MatchResult::matched(question_id, MatchTier::Heuristic, set, template)
                    })
            })
    }
}

/// Leading alphabetic run of `question_id`, capped at `max_len` characters.
/// Runs shorter than the minimum prefix yield `None` so a single letter
/// never matches half the catalog.
pub fn heuristic_prefix(question_id: &str, max_len: usize) -> Option<String> {
    let prefix = leading_alphabetic(question_id)
        .chars()
        .take(max_len)
        .collect::<String>();

    if prefix.len() < MIN_HEURISTIC_PREFIX_LEN {
        return None;
    }
    Some(prefix)
}

/// True when `prefix` and the template id's own alphabetic run agree on
/// their common length, and that length is at least the minimum prefix.
/// `social3` therefore reaches `so1`, and `sa99` reaches `sat2`.
fn shares_alphabetic_prefix(prefix: &str, template_id: &str) -> bool {
    let template_run = leading_alphabetic(template_id);
    let shared = prefix.len().min(template_run.len());

    shared >= MIN_HEURISTIC_PREFIX_LEN
        && prefix[..shared].eq_ignore_ascii_case(&template_run[..shared])
}

fn leading_alphabetic(value: &str) -> &str {
    let end = value
        .find(|ch: char| !ch.is_ascii_alphabetic())
        .unwrap_or(value.len());
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_HEURISTIC_PREFIX_LEN;
    use crate::model::APPROXIMATE_MATCH_SUFFIX;
    use crate::registry::tests::{set, template};

    fn two_band_registry() -> TemplateRegistry {
        TemplateRegistry::new(vec![
            set(
                "lower-v1",
                GradeBand::Lower,
                vec![
                    template("a1", "lower a1", GradeBand::Lower),
                    template("sm1", "lower sm1", GradeBand::Lower),
                    template("rel1", "lower rel1", GradeBand::Lower),
                ],
            ),
            set(
                "upper-v1",
                GradeBand::Upper,
                vec![
                    template("a1", "upper a1", GradeBand::Upper),
                    template("up7", "upper only", GradeBand::Upper),
                    template("rel2", "upper rel2", GradeBand::Upper),
                ],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn same_grade_exact_match_has_full_confidence() {
        let registry = two_band_registry();
        let resolver = QuestionResolver::new(&registry, DEFAULT_HEURISTIC_PREFIX_LEN);

        let result = resolver.resolve("sm1", GradeBand::Lower);
        assert!(result.resolved);
        assert_eq!(result.tier, MatchTier::Exact);
        assert_eq!(result.confidence, 100);
        assert_eq!(result.source_set_id, Some("lower-v1"));
        assert_eq!(result.template.map(|t| t.text.as_str()), Some("lower sm1"));
        assert_eq!(result.display_text.as_deref(), Some("lower sm1"));
    }

    #[test]
    fn colliding_ids_stay_grade_scoped() {
        let registry = two_band_registry();
        let resolver = QuestionResolver::new(&registry, DEFAULT_HEURISTIC_PREFIX_LEN);

        let lower = resolver.resolve("a1", GradeBand::Lower);
        assert_eq!(lower.tier, MatchTier::Exact);
        assert_eq!(lower.confidence, 100);
        assert_eq!(lower.template.map(|t| t.text.as_str()), Some("lower a1"));

        let upper = resolver.resolve("a1", GradeBand::Upper);
        assert_eq!(upper.tier, MatchTier::Exact);
        assert_eq!(upper.confidence, 100);
        assert_eq!(upper.template.map(|t| t.text.as_str()), Some("upper a1"));
        assert_eq!(upper.source_set_id, Some("upper-v1"));
    }

    #[test]
    fn other_grade_hit_is_cross_grade() {
        let registry = two_band_registry();
        let resolver = QuestionResolver::new(&registry, DEFAULT_HEURISTIC_PREFIX_LEN);

        let result = resolver.resolve("up7", GradeBand::Lower);
        assert_eq!(result.tier, MatchTier::CrossGrade);
        assert_eq!(result.confidence, 75);
        assert_eq!(result.source_set_id, Some("upper-v1"));
    }

    #[test]
    fn shared_prefix_falls_back_to_heuristic_in_registration_order() {
        let registry = two_band_registry();
        let resolver = QuestionResolver::new(&registry, DEFAULT_HEURISTIC_PREFIX_LEN);

        // Both sets carry a "rel" template; the lower set is registered first.
        let result = resolver.resolve("rel9", GradeBand::Upper);
        assert_eq!(result.tier, MatchTier::Heuristic);
        assert_eq!(result.confidence, 50);
        assert_eq!(result.source_set_id, Some("lower-v1"));
        assert_eq!(result.question_id, "rel9");
        assert_eq!(
            result.display_text,
            Some(format!("lower rel1{APPROXIMATE_MATCH_SUFFIX}"))
        );
        assert!(result.needs_review());
    }

    #[test]
    fn heuristic_prefix_is_case_insensitive() {
        let registry = two_band_registry();
        let resolver = QuestionResolver::new(&registry, DEFAULT_HEURISTIC_PREFIX_LEN);

        let result = resolver.resolve("SM42", GradeBand::Upper);
        assert_eq!(result.tier, MatchTier::Heuristic);
        assert_eq!(result.template.map(|t| t.id.as_str()), Some("sm1"));
    }

    #[test]
    fn unknown_and_malformed_ids_are_unresolved() {
        let registry = two_band_registry();
        let resolver = QuestionResolver::new(&registry, DEFAULT_HEURISTIC_PREFIX_LEN);

        for id in ["zz9", "", "   ", "x", "42", "q-unknown"] {
            let result = resolver.resolve(id, GradeBand::Lower);
            assert!(!result.resolved, "{id:?} should not resolve");
            assert_eq!(result.tier, MatchTier::Unresolved);
            assert_eq!(result.confidence, 0);
            assert!(result.template.is_none());
            assert!(result.source_set_id.is_none());
            assert!(result.display_text.is_none());
        }
    }

    #[test]
    fn resolution_is_deterministic() {
        let registry = two_band_registry();
        let resolver = QuestionResolver::new(&registry, DEFAULT_HEURISTIC_PREFIX_LEN);
        assert_eq!(
            resolver.resolve("rel5", GradeBand::Lower),
            resolver.resolve("rel5", GradeBand::Lower)
        );
    }

    #[test]
    fn missing_primary_set_still_allows_cross_grade() {
        let registry = TemplateRegistry::new(vec![set(
            "upper-v1",
            GradeBand::Upper,
            vec![template("up7", "upper only", GradeBand::Upper)],
        )])
        .unwrap();
        let resolver = QuestionResolver::new(&registry, DEFAULT_HEURISTIC_PREFIX_LEN);

        let result = resolver.resolve("up7", GradeBand::Lower);
        assert_eq!(result.tier, MatchTier::CrossGrade);
    }

    #[test]
    fn heuristic_prefix_requires_two_letters() {
        assert_eq!(heuristic_prefix("sm12", 3).as_deref(), Some("sm"));
        assert_eq!(heuristic_prefix("relation4", 3).as_deref(), Some("rel"));
        assert_eq!(heuristic_prefix("a1", 3), None);
        assert_eq!(heuristic_prefix("9ab", 3), None);
    }

    #[test]
    fn longer_ids_reach_two_letter_domain_codes() {
        let registry = TemplateRegistry::builtin().unwrap();
        let resolver = QuestionResolver::new(&registry, DEFAULT_HEURISTIC_PREFIX_LEN);

        let cases = [
            ("social3", "so1"),
            ("sat5", "sa1"),
            ("sam2", "sa1"),
            ("sa99", "sa1"),
        ];
        for (id, expected) in cases {
            let result = resolver.resolve(id, GradeBand::Lower);
            assert_eq!(result.tier, MatchTier::Heuristic, "{id} should match heuristically");
            assert_eq!(result.template.map(|t| t.id.as_str()), Some(expected));
            assert_eq!(result.source_set_id, Some("sel-lower-v1"));
        }
    }

    #[test]
    fn shorter_ids_reach_longer_template_runs() {
        let registry = two_band_registry();
        let resolver = QuestionResolver::new(&registry, DEFAULT_HEURISTIC_PREFIX_LEN);

        let result = resolver.resolve("re4", GradeBand::Lower);
        assert_eq!(result.tier, MatchTier::Heuristic);
        assert_eq!(result.template.map(|t| t.id.as_str()), Some("rel1"));

        // "a1" has a one-letter run and never takes part in heuristic matching.
        assert_eq!(resolver.resolve("ab3", GradeBand::Lower).tier, MatchTier::Unresolved);
    }

    #[test]
    fn padded_ids_resolve_like_their_trimmed_form() {
        let registry = two_band_registry();
        let resolver = QuestionResolver::new(&registry, DEFAULT_HEURISTIC_PREFIX_LEN);

        let result = resolver.resolve("  sm1 ", GradeBand::Lower);
        assert_eq!(result.tier, MatchTier::Exact);
        assert_eq!(result.question_id, "  sm1 ");
    }
}
