//! Skill Catalog
//!
//! Declarative skill definitions loaded from TOML. A skill names a kind of
//! task ("order food", "post a status"), the keywords that identify it and the
//! apps that can carry it out, each either by delegation (a deep link straight
//! into the app) or by GUI automation (a step list the agent follows).
//!
//! ```toml
//! [[skills]]
//! id = "order_food"
//! name = "Order food"
//! keywords = ["burger", "order", "food"]
//!
//! [[skills.apps]]
//! package = "com.example.food"
//! name = "Foodie"
//! priority = 100
//! execution_type = "delegation"
//! deep_link = "foodie://search?q={query}"
//! ```

use sdk::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// How a related app carries out a skill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    /// Hand the task to the app through a deep link
    #[serde(alias = "Delegation", alias = "DELEGATION")]
    Delegation,
    /// Drive the app's UI step by step
    #[serde(alias = "GuiAutomation", alias = "GUI_AUTOMATION")]
    GuiAutomation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedApp {
    pub package: String,
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    pub execution_type: ExecutionType,
    /// URI template with `{param}` placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_link: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RelatedApp {
    /// "Name (package)" for prompts and logs
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.package)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Constraint injected into Actor prompts, e.g. a character limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_hint: Option<String>,
    #[serde(default)]
    pub apps: Vec<RelatedApp>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillCatalog {
    #[serde(default)]
    skills: Vec<Skill>,
}

impl SkillCatalog {
    pub fn new(skills: Vec<Skill>) -> Result<Self, EngineError> {
        let catalog = Self { skills };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, EngineError> {
        let catalog: SkillCatalog = toml::from_str(content)
            .map_err(|e| EngineError::Catalog(format!("Failed to parse skill catalog: {}", e)))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load the catalog file; a missing file is an empty catalog
    pub async fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            info!(
                "No skill catalog at {}, intent matching disabled",
                path.display()
            );
            return Ok(Self::empty());
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            EngineError::Catalog(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_toml_str(&content)?;
        debug!(
            "Loaded {} skill(s) from {}",
            catalog.skills.len(),
            path.display()
        );
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), EngineError> {
        let mut seen = HashSet::new();
        for skill in &self.skills {
            if skill.id.trim().is_empty() {
                return Err(EngineError::Catalog(format!(
                    "Skill '{}' has an empty id",
                    skill.name
                )));
            }
            if !seen.insert(skill.id.as_str()) {
                return Err(EngineError::Catalog(format!(
                    "Duplicate skill id '{}'",
                    skill.id
                )));
            }
            for app in &skill.apps {
                if app.package.trim().is_empty() {
                    return Err(EngineError::Catalog(format!(
                        "Skill '{}' lists an app without a package",
                        skill.id
                    )));
                }
                if app.execution_type == ExecutionType::Delegation && app.deep_link.is_none() {
                    return Err(EngineError::Catalog(format!(
                        "Delegation app {} in skill '{}' needs a deep_link",
                        app.package, skill.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn skills(&self) -> &[Skill] {
        &self.skills
    }

    pub fn get(&self, id: &str) -> Option<&Skill> {
        self.skills.iter().find(|s| s.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
[[skills]]
id = "order_food"
name = "Order food"
keywords = ["burger", "order"]

[[skills.apps]]
package = "com.example.food"
name = "Foodie"
priority = 100
execution_type = "delegation"
deep_link = "foodie://search?q={query}"

[[skills]]
id = "post_status"
name = "Post a status"
prompt_hint = "Keep posts under 280 characters"

[[skills.apps]]
package = "com.example.social"
name = "Chirp"
execution_type = "GuiAutomation"
steps = ["Open compose", "Type the text", "Tap Post"]
"#;

    #[test]
    fn test_parse_catalog() {
        let catalog = SkillCatalog::from_toml_str(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);

        let food = catalog.get("order_food").unwrap();
        assert_eq!(food.apps[0].execution_type, ExecutionType::Delegation);
        assert_eq!(food.apps[0].priority, 100);

        let post = catalog.get("post_status").unwrap();
        assert_eq!(post.apps[0].execution_type, ExecutionType::GuiAutomation);
        assert_eq!(post.apps[0].steps.len(), 3);
        assert_eq!(post.apps[0].priority, 0);
        assert!(post.keywords.is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let doubled = format!("{}\n[[skills]]\nid = \"order_food\"\nname = \"Again\"\n", CATALOG);
        assert!(matches!(
            SkillCatalog::from_toml_str(&doubled),
            Err(EngineError::Catalog(_))
        ));
    }

    #[test]
    fn test_delegation_without_link_rejected() {
        let bad = r#"
[[skills]]
id = "x"
name = "X"
[[skills.apps]]
package = "a.b"
name = "A"
execution_type = "delegation"
"#;
        assert!(SkillCatalog::from_toml_str(bad).is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = SkillCatalog::load(&dir.path().join("skills.toml")).await.unwrap();
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skills.toml");
        tokio::fs::write(&path, CATALOG).await.unwrap();
        let catalog = SkillCatalog::load(&path).await.unwrap();
        assert_eq!(catalog.skills()[0].id, "order_food");
    }
}
