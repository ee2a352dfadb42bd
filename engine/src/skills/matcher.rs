//! Intent/Skill matcher
//!
//! Maps a free-text task to a catalog skill and the app that should carry it
//! out. Matching is an ordered list of strategies, each with its own
//! acceptance threshold: by default the model classifier first, then keyword
//! scoring. The first strategy that yields a skill with an installed app wins.
//!
//! A Delegation app matched with enough confidence takes the fast path: the
//! task is handed to the app through a deep link and the agent loop never
//! runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::apps::{AppSnapshot, InstalledApps};
use super::catalog::{ExecutionType, RelatedApp, Skill, SkillCatalog};
use super::deeplink;
use crate::config::SkillsConfig;
use crate::llm::{extract_json_payload, LLMError, ModelGateway, Prompt};

/// Parameter name carrying the user's request in deep-link templates
pub const QUERY_PARAM: &str = "query";

/// Highest score a non-exact keyword match can reach
const PARTIAL_MATCH_CEILING: f64 = 0.99;
const CONTAINED_KEYWORD_BASE: f64 = 0.3;
const CONTAINED_KEYWORD_WEIGHT: f64 = 0.7;
const TOKEN_BONUS: f64 = 0.1;

/// A skill proposed by a strategy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSkill {
    pub skill_id: String,
    pub score: f64,
    pub strategy: String,
}

/// A skill bound to the installed app that will run it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailableAppMatch {
    pub skill: Skill,
    pub app: RelatedApp,
    pub params: HashMap<String, String>,
    pub confidence: f64,
    pub strategy: String,
}

impl AvailableAppMatch {
    pub fn is_fast_path_eligible(&self, min_confidence: f64) -> bool {
        self.app.execution_type == ExecutionType::Delegation && self.confidence >= min_confidence
    }

    /// Rendered deep link, if the app has a template and every parameter is known
    pub fn deep_link(&self) -> Option<String> {
        self.app
            .deep_link
            .as_deref()
            .and_then(|template| deeplink::render(template, &self.params))
    }
}

/// What to do with a task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum ExecutionPlan {
    /// Open the deep link and skip the agent loop
    FastPath { matched: AvailableAppMatch, uri: String },
    /// Run the agent loop, with the matched skill as guidance when there is one
    AgentLoop { matched: Option<AvailableAppMatch> },
}

#[async_trait]
pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Candidate skills for `query`, best first, already filtered by this
    /// strategy's threshold
    async fn candidates(
        &self,
        query: &str,
        catalog: &SkillCatalog,
        installed: &AppSnapshot,
    ) -> Vec<ScoredSkill>;
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Keyword-overlap score of `query` against a skill's keywords, in [0, 1].
///
/// An exact keyword match scores 1.0. Otherwise every keyword contained in
/// the query adds `0.3 + 0.7 * len(keyword) / len(query)` and every query
/// token of two or more characters found inside a keyword adds 0.1; the sum
/// is capped just below 1.0.
pub fn keyword_score(query: &str, keywords: &[String]) -> f64 {
    let query = normalize(query);
    if query.is_empty() {
        return 0.0;
    }
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| normalize(k))
        .filter(|k| !k.is_empty())
        .collect();

    if keywords.iter().any(|k| *k == query) {
        return 1.0;
    }

    let query_len = query.chars().count() as f64;
    let mut score = 0.0;

    for keyword in &keywords {
        if query.contains(keyword.as_str()) {
            score += CONTAINED_KEYWORD_BASE
                + CONTAINED_KEYWORD_WEIGHT * keyword.chars().count() as f64 / query_len;
        }
    }

    let tokens = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2);
    let mut seen = Vec::new();
    for token in tokens {
        if seen.contains(&token) {
            continue;
        }
        seen.push(token);
        if keywords.iter().any(|k| k.contains(token)) {
            score += TOKEN_BONUS;
        }
    }

    score.clamp(0.0, PARTIAL_MATCH_CEILING)
}

/// Keyword scoring over the whole catalog
pub struct KeywordStrategy {
    threshold: f64,
}

impl KeywordStrategy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Every skill scoring at least the threshold, best first, ties in catalog order
    pub fn rank(&self, query: &str, catalog: &SkillCatalog) -> Vec<ScoredSkill> {
        let mut scored: Vec<ScoredSkill> = catalog
            .skills()
            .iter()
            .map(|skill| ScoredSkill {
                skill_id: skill.id.clone(),
                score: keyword_score(query, &skill.keywords),
                strategy: "keyword".to_string(),
            })
            .filter(|s| s.score > 0.0 && s.score >= self.threshold)
            .collect();
        // sort_by is stable, so equal scores keep catalog order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored
    }
}

#[async_trait]
impl MatchStrategy for KeywordStrategy {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn candidates(
        &self,
        query: &str,
        catalog: &SkillCatalog,
        _installed: &AppSnapshot,
    ) -> Vec<ScoredSkill> {
        self.rank(query, catalog)
    }
}

pub const CLASSIFIER_SYSTEM: &str = "You are the Intent Classifier of an agent that operates an Android phone.\n\
Decide which of the listed skills the user's task belongs to.\n\n\
Respond with a single JSON object and nothing else:\n\
{\"skill_id\":\"<id from the list, or null>\",\"confidence\":<0.0 to 1.0>,\"reasoning\":\"<one sentence>\"}\n\
Use null when no skill fits.";

/// Strict response contract of the classifier
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentResponse {
    pub skill_id: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

pub fn parse_intent(content: &str) -> Result<IntentResponse, LLMError> {
    let payload = extract_json_payload(content)?;
    serde_json::from_str(payload)
        .map_err(|e| LLMError::MalformedResponse(format!("intent: {}", e)))
}

/// Classification through the model gateway
pub struct ModelStrategy {
    gateway: Arc<ModelGateway>,
    threshold: f64,
}

impl ModelStrategy {
    pub fn new(gateway: Arc<ModelGateway>, threshold: f64) -> Self {
        Self { gateway, threshold }
    }

    /// Prompt listing only skills with at least one installed app
    pub fn prompt(query: &str, catalog: &SkillCatalog, installed: &AppSnapshot) -> Option<Prompt> {
        let mut listing = String::new();
        for skill in catalog.skills() {
            if select_app(skill, installed).is_none() {
                continue;
            }
            let _ = write!(listing, "- {}: {}", skill.id, skill.name);
            if !skill.description.is_empty() {
                let _ = write!(listing, ". {}", skill.description);
            }
            if !skill.keywords.is_empty() {
                let _ = write!(listing, " (keywords: {})", skill.keywords.join(", "));
            }
            listing.push('\n');
        }
        if listing.is_empty() {
            return None;
        }
        Some(Prompt::new(
            CLASSIFIER_SYSTEM,
            format!("Skills:\n{}\nTask: {}", listing, query.trim()),
        ))
    }
}

#[async_trait]
impl MatchStrategy for ModelStrategy {
    fn name(&self) -> &str {
        "model"
    }

    async fn candidates(
        &self,
        query: &str,
        catalog: &SkillCatalog,
        installed: &AppSnapshot,
    ) -> Vec<ScoredSkill> {
        let Some(prompt) = Self::prompt(query, catalog, installed) else {
            debug!("No skill has an installed app, skipping model classifier");
            return Vec::new();
        };

        let response = match self.gateway.predict(&prompt).await.and_then(|c| parse_intent(&c)) {
            Ok(response) => response,
            Err(e) => {
                warn!("Intent classifier unavailable, falling back: {}", e);
                return Vec::new();
            }
        };

        let Some(skill_id) = response.skill_id else {
            debug!("Classifier found no skill: {}", response.reasoning);
            return Vec::new();
        };

        if catalog.get(&skill_id).is_none() {
            warn!("Classifier returned unknown skill '{}'", skill_id);
            return Vec::new();
        }

        let confidence = response.confidence.clamp(0.0, 1.0);
        if confidence < self.threshold {
            debug!(
                "Classifier confidence {:.2} for '{}' below {:.2}",
                confidence, skill_id, self.threshold
            );
            return Vec::new();
        }

        vec![ScoredSkill {
            skill_id,
            score: confidence,
            strategy: "model".to_string(),
        }]
    }
}

/// The installed app with the highest priority; ties go to the first listed
pub fn select_app<'a>(skill: &'a Skill, installed: &AppSnapshot) -> Option<&'a RelatedApp> {
    let mut best: Option<&RelatedApp> = None;
    for app in skill.apps.iter().filter(|a| installed.is_installed(&a.package)) {
        match best {
            Some(current) if current.priority >= app.priority => {}
            _ => best = Some(app),
        }
    }
    best
}

pub struct IntentMatcher {
    catalog: Arc<SkillCatalog>,
    apps: Arc<InstalledApps>,
    strategies: Vec<Box<dyn MatchStrategy>>,
    fast_path_confidence: f64,
}

impl IntentMatcher {
    pub fn new(
        catalog: Arc<SkillCatalog>,
        apps: Arc<InstalledApps>,
        strategies: Vec<Box<dyn MatchStrategy>>,
        fast_path_confidence: f64,
    ) -> Self {
        Self {
            catalog,
            apps,
            strategies,
            fast_path_confidence,
        }
    }

    /// Model classifier (when enabled and a gateway is given), then keywords
    pub fn from_config(
        config: &SkillsConfig,
        catalog: Arc<SkillCatalog>,
        apps: Arc<InstalledApps>,
        gateway: Option<Arc<ModelGateway>>,
    ) -> Self {
        let mut strategies: Vec<Box<dyn MatchStrategy>> = Vec::new();
        if config.use_model_classifier {
            if let Some(gateway) = gateway {
                strategies.push(Box::new(ModelStrategy::new(
                    gateway,
                    config.model_confidence_threshold,
                )));
            }
        }
        strategies.push(Box::new(KeywordStrategy::new(config.keyword_threshold)));
        Self::new(catalog, apps, strategies, config.fast_path_confidence)
    }

    pub fn catalog(&self) -> &SkillCatalog {
        &self.catalog
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Best skill for `query` that has an installed app
    pub async fn find(&self, query: &str) -> Option<AvailableAppMatch> {
        if self.catalog.is_empty() {
            return None;
        }
        let installed = self.apps.snapshot();

        for strategy in &self.strategies {
            let candidates = strategy
                .candidates(query, &self.catalog, &installed)
                .await;
            for candidate in candidates {
                let Some(skill) = self.catalog.get(&candidate.skill_id) else {
                    continue;
                };
                let Some(app) = select_app(skill, &installed) else {
                    debug!("Skill '{}' matched but no app is installed", skill.id);
                    continue;
                };
                info!(
                    "Matched skill '{}' via {} ({:.2}) -> {}",
                    skill.id,
                    candidate.strategy,
                    candidate.score,
                    app.label()
                );
                let mut params = HashMap::new();
                params.insert(QUERY_PARAM.to_string(), query.trim().to_string());
                return Some(AvailableAppMatch {
                    skill: skill.clone(),
                    app: app.clone(),
                    params,
                    confidence: candidate.score,
                    strategy: candidate.strategy,
                });
            }
        }
        None
    }

    /// Decide between the fast path and the agent loop
    pub async fn plan(&self, query: &str) -> ExecutionPlan {
        match self.find(query).await {
            Some(matched) if matched.is_fast_path_eligible(self.fast_path_confidence) => {
                match matched.deep_link() {
                    Some(uri) => ExecutionPlan::FastPath { matched, uri },
                    None => {
                        debug!(
                            "Deep link for {} could not be rendered, using the agent loop",
                            matched.app.package
                        );
                        ExecutionPlan::AgentLoop {
                            matched: Some(matched),
                        }
                    }
                }
            }
            matched => ExecutionPlan::AgentLoop { matched },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(package: &str, priority: i32, execution_type: ExecutionType) -> RelatedApp {
        RelatedApp {
            package: package.to_string(),
            name: package.to_string(),
            priority,
            execution_type,
            deep_link: match execution_type {
                ExecutionType::Delegation => Some(format!("{}://go?q={{query}}", package)),
                ExecutionType::GuiAutomation => None,
            },
            steps: Vec::new(),
            description: None,
        }
    }

    fn skill(id: &str, keywords: &[&str], apps: Vec<RelatedApp>) -> Skill {
        Skill {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            prompt_hint: None,
            apps,
        }
    }

    fn keywords(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_exact_keyword_scores_one() {
        assert_eq!(keyword_score("Burger", &keywords(&["burger", "order"])), 1.0);
        assert_eq!(keyword_score("  set   alarm ", &keywords(&["set alarm"])), 1.0);
    }

    #[test]
    fn test_partial_scores_stay_below_one() {
        let score = keyword_score("Order a burger nearby", &keywords(&["burger", "order"]));
        assert!(score >= 0.8 && score < 1.0, "score {}", score);
        assert_eq!(keyword_score("do something obscure", &keywords(&["burger"])), 0.0);
    }

    #[test]
    fn test_token_bonus_only() {
        // "burger" is inside "burgers" but the keyword is not in the query
        let score = keyword_score("burger please", &keywords(&["burgers"]));
        assert!((score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_rank_ties_keep_catalog_order() {
        let catalog = SkillCatalog::new(vec![
            skill("first", &["music"], vec![]),
            skill("second", &["music"], vec![]),
            skill("exact", &["play music"], vec![]),
        ])
        .unwrap();
        let ranked = KeywordStrategy::new(0.3).rank("play music", &catalog);
        let ids: Vec<&str> = ranked.iter().map(|s| s.skill_id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "first", "second"]);
    }

    #[test]
    fn test_select_app_highest_installed_priority() {
        let s = skill(
            "s",
            &[],
            vec![
                app("p10", 10, ExecutionType::GuiAutomation),
                app("p30", 30, ExecutionType::GuiAutomation),
                app("p20", 20, ExecutionType::GuiAutomation),
            ],
        );
        let installed = AppSnapshot::new(vec!["p30".to_string(), "p20".to_string()]);
        assert_eq!(select_app(&s, &installed).unwrap().package, "p30");

        let only_low = AppSnapshot::new(vec!["p10".to_string()]);
        assert_eq!(select_app(&s, &only_low).unwrap().package, "p10");
        assert!(select_app(&s, &AppSnapshot::default()).is_none());
    }

    #[test]
    fn test_select_app_tie_goes_to_first() {
        let s = skill(
            "s",
            &[],
            vec![
                app("a", 50, ExecutionType::GuiAutomation),
                app("b", 50, ExecutionType::GuiAutomation),
            ],
        );
        let installed = AppSnapshot::new(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(select_app(&s, &installed).unwrap().package, "a");
    }

    #[test]
    fn test_fast_path_threshold() {
        let mut matched = AvailableAppMatch {
            skill: skill("s", &[], vec![]),
            app: app("food", 100, ExecutionType::Delegation),
            params: HashMap::new(),
            confidence: 0.8,
            strategy: "keyword".into(),
        };
        assert!(matched.is_fast_path_eligible(0.8));
        matched.confidence = 0.79;
        assert!(!matched.is_fast_path_eligible(0.8));

        matched.confidence = 0.95;
        matched.app.execution_type = ExecutionType::GuiAutomation;
        assert!(!matched.is_fast_path_eligible(0.8));
    }

    #[test]
    fn test_parse_intent_is_strict() {
        let ok = parse_intent(r#"{"skill_id":"order_food","confidence":0.9,"reasoning":"food"}"#)
            .unwrap();
        assert_eq!(ok.skill_id.as_deref(), Some("order_food"));

        let none = parse_intent(r#"{"skill_id":null,"confidence":0.0,"reasoning":"none"}"#).unwrap();
        assert!(none.skill_id.is_none());

        assert!(parse_intent(r#"{"skill_id":"x","confidence":0.9,"extra":1}"#).is_err());
        assert!(parse_intent(r#"{"skill_id":"x"}"#).is_err());
    }

    #[test]
    fn test_classifier_prompt_lists_only_installed_skills() {
        let catalog = SkillCatalog::new(vec![
            skill("with_app", &[], vec![app("installed", 1, ExecutionType::GuiAutomation)]),
            skill("without_app", &[], vec![app("missing", 1, ExecutionType::GuiAutomation)]),
        ])
        .unwrap();
        let installed = AppSnapshot::new(vec!["installed".to_string()]);
        let prompt = ModelStrategy::prompt("q", &catalog, &installed).unwrap();
        assert!(prompt.user.contains("with_app"));
        assert!(!prompt.user.contains("without_app"));

        assert!(ModelStrategy::prompt("q", &catalog, &AppSnapshot::default()).is_none());
    }
}
