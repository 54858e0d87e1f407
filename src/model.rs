use std::collections::{BTreeMap, HashSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum GradeBand {
    Lower,
    Upper,
}

impl GradeBand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lower => "lower",
            Self::Upper => "upper",
        }
    }
}

impl Display for GradeBand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five SEL competency areas. Anything else recorded at submission time
/// lands in `Unrecognized` so distributions stay exhaustive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SelDomain {
    SelfAwareness,
    SelfManagement,
    SocialAwareness,
    RelationshipSkills,
    ResponsibleDecisionMaking,
    #[serde(other)]
    Unrecognized,
}

impl SelDomain {
    pub const ALL: [Self; 6] = [
        Self::SelfAwareness,
        Self::SelfManagement,
        Self::SocialAwareness,
        Self::RelationshipSkills,
        Self::ResponsibleDecisionMaking,
        Self::Unrecognized,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseType {
    NumericScale,
    SingleChoice,
    FreeText,
    EmotionChoice,
    #[serde(other)]
    Unrecognized,
}

impl ResponseType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NumericScale => "numeric-scale",
            Self::SingleChoice => "single-choice",
            Self::FreeText => "free-text",
            Self::EmotionChoice => "emotion-choice",
            Self::Unrecognized => "unrecognized",
        }
    }

    pub fn uses_choice_options(self) -> bool {
        matches!(self, Self::SingleChoice | Self::EmotionChoice)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ScaleLabels {
    pub min: String,
    pub max: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct QuestionTemplate {
    pub id: String,
    pub text: String,
    pub response_type: ResponseType,
    pub domain: SelDomain,
    pub grade_band: GradeBand,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choice_options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_labels: Option<ScaleLabels>,
    #[serde(default)]
    pub sub_category: String,
    #[serde(default = "default_analysis_weight")]
    pub analysis_weight: u8,
}

fn default_analysis_weight() -> u8 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct TemplateSet {
    pub id: String,
    pub grade_band: GradeBand,
    pub templates: Vec<QuestionTemplate>,
}

impl TemplateSet {
    pub fn find(&self, question_id: &str) -> Option<&QuestionTemplate> {
        self.templates
            .iter()
            .find(|template| template.id == question_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateCatalog {
    pub template_sets: Vec<TemplateSet>,
}

/// Answer payload as stored. JSON numbers, strings and string arrays map
/// onto the three variants; any other shape is rejected at load time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnswerValue {
    Numeric(f64),
    Text(String),
    Choices(Vec<String>),
}

impl AnswerValue {
    pub fn kind(&self) -> AnswerKind {
        match self {
            Self::Numeric(_) => AnswerKind::Numeric,
            Self::Text(_) => AnswerKind::Textual,
            Self::Choices(_) => AnswerKind::List,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerKind {
    Numeric,
    Textual,
    List,
}

impl AnswerKind {
    pub const ALL: [Self; 3] = [Self::Numeric, Self::Textual, Self::List];
}

/// Key under which question ids are compared everywhere: surrounding
/// whitespace is not part of the id.
pub fn normalize_question_id(raw: &str) -> &str {
    raw.trim()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerRecord {
    pub question_id: String,
    pub answer_value: AnswerValue,
    pub domain: SelDomain,
    pub respondent_grade_band: GradeBand,
}

impl AnswerRecord {
    pub fn normalized_question_id(&self) -> &str {
        normalize_question_id(&self.question_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum MatchTier {
    Exact,
    CrossGrade,
    Heuristic,
    Unresolved,
}

impl MatchTier {
    pub const ALL: [Self; 4] = [
        Self::Exact,
        Self::CrossGrade,
        Self::Heuristic,
        Self::Unresolved,
    ];

    pub fn confidence(self) -> u8 {
        match self {
            Self::Exact => 100,
            Self::CrossGrade => 75,
            Self::Heuristic => 50,
            Self::Unresolved => 0,
        }
    }
}

pub const APPROXIMATE_MATCH_SUFFIX: &str = " (approximate match)";

/// Outcome of resolving one question id. Only built through
/// [`MatchResult::matched`] and [`MatchResult::unresolved`], so an
/// unresolved result never carries a template, a source set or confidence.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MatchResult<'a> {
    pub question_id: String,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<&'a QuestionTemplate>,
    pub tier: MatchTier,
    pub confidence: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_set_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,
}

impl<'a> MatchResult<'a> {
    pub fn matched(
        question_id: &str,
        tier: MatchTier,
        set: &'a TemplateSet,
        template: &'a QuestionTemplate,
    ) -> Self {
        if tier == MatchTier::Unresolved {
            return Self::unresolved(question_id);
        }

        let display_text = if tier == MatchTier::Heuristic {
            format!("{}{APPROXIMATE_MATCH_SUFFIX}", template.text)
        } else {
            template.text.clone()
        };

        Self {
            question_id: question_id.to_string(),
            resolved: true,
            template: Some(template),
            tier,
            confidence: tier.confidence(),
            source_set_id: Some(set.id.as_str()),
            display_text: Some(display_text),
        }
    }

    pub fn unresolved(question_id: &str) -> Self {
        Self {
            question_id: question_id.to_string(),
            resolved: false,
            template: None,
            tier: MatchTier::Unresolved,
            confidence: 0,
            source_set_id: None,
            display_text: None,
        }
    }

    pub fn needs_review(&self) -> bool {
        matches!(self.tier, MatchTier::Heuristic | MatchTier::Unresolved)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }

    /// Poor data lowers trust in downstream insights; it never fails the caller.
    pub fn is_advisory(self) -> bool {
        self == Self::Poor
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QualityReport {
    pub total_answers: usize,
    pub unique_questions: usize,
    pub counts_by_tier: BTreeMap<MatchTier, usize>,
    pub match_rate: f64,
    pub domain_distribution: BTreeMap<SelDomain, usize>,
    pub answer_type_distribution: BTreeMap<AnswerKind, usize>,
    pub quality_level: QualityLevel,
    pub unresolved_question_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum LinkMethod {
    TemplatePattern,
    OverlapMatch,
    FallbackDefault,
}

impl LinkMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TemplatePattern => "template-pattern",
            Self::OverlapMatch => "overlap-match",
            Self::FallbackDefault => "fallback-default",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "template-pattern" => Some(Self::TemplatePattern),
            "overlap-match" => Some(Self::OverlapMatch),
            "fallback-default" => Some(Self::FallbackDefault),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SurveyIdentityLink {
    pub answer_batch_id: String,
    pub inferred_survey_id: String,
    pub method: LinkMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlap_ratio: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyAnswerBatch {
    pub batch_id: String,
    #[serde(default)]
    pub survey_type: Option<String>,
    #[serde(default)]
    pub survey_id: Option<String>,
    pub answers: Vec<AnswerRecord>,
}

impl LegacyAnswerBatch {
    /// Normalized question ids in first-seen order, without repeats.
    pub fn unique_question_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.answers
            .iter()
            .map(AnswerRecord::normalized_question_id)
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFile {
    pub batches: Vec<LegacyAnswerBatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomSurvey {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub question_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyFile {
    pub surveys: Vec<CustomSurvey>,
}
