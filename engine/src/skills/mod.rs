//! Skills
//!
//! Catalog of known task types, the installed-app registry and the intent
//! matcher that decides between delegating a task to an app and running the
//! full agent loop.

pub mod apps;
pub mod catalog;
pub mod deeplink;
pub mod matcher;

pub use apps::{AppScanner, AppSnapshot, InstalledApps};
pub use catalog::{ExecutionType, RelatedApp, Skill, SkillCatalog};
pub use matcher::{
    keyword_score, select_app, AvailableAppMatch, ExecutionPlan, IntentMatcher, KeywordStrategy,
    MatchStrategy, ModelStrategy, ScoredSkill,
};
