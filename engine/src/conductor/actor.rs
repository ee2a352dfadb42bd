//! Conductor Actor
//!
//! Turns the current screen and sub-goal into exactly one `Action`. A response
//! that does not map onto a known action with complete parameters is an
//! explicit `Unparseable` error; the Actor never guesses.

use crate::conductor::prompt::actor_prompt;
use crate::conductor::workspace::Workspace;
use crate::llm::{extract_json_payload, truncate, LLMError, ModelGateway};
use sdk::{Action, KeyCode};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActorError {
    #[error("Unparseable action: {0}")]
    Unparseable(String),

    #[error("Actor model call failed: {0}")]
    Model(#[from] LLMError),
}

pub struct Actor {
    gateway: Arc<ModelGateway>,
}

/// Map raw model output onto an `Action`
pub fn parse_action(content: &str) -> Result<Action, ActorError> {
    let payload = extract_json_payload(content).map_err(|e| ActorError::Unparseable(e.to_string()))?;

    let mut value: Value = serde_json::from_str(payload)
        .map_err(|e| ActorError::Unparseable(format!("invalid JSON: {}", e)))?;

    // Key names drift ("return", "recents"); normalize before strict decoding
    if value.get("action").and_then(Value::as_str) == Some("press_key") {
        if let Some(raw) = value.get("key").and_then(Value::as_str) {
            let key = KeyCode::parse(raw)
                .ok_or_else(|| ActorError::Unparseable(format!("unknown key '{}'", raw)))?;
            value["key"] = serde_json::to_value(key)
                .map_err(|e| ActorError::Unparseable(e.to_string()))?;
        }
    }

    let action: Action = serde_json::from_value(value).map_err(|e| {
        ActorError::Unparseable(format!("{} in {}", e, truncate(payload, 120)))
    })?;

    action.validate().map_err(ActorError::Unparseable)?;
    Ok(action)
}

impl Actor {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn decide(&self, ws: &Workspace) -> Result<Action, ActorError> {
        let prompt = actor_prompt(ws);
        let content = self.gateway.predict(&prompt).await?;
        tracing::debug!("Actor output: {}", truncate(&content, 200));
        parse_action(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tap() {
        assert_eq!(
            parse_action(r#"{"action":"tap","x":540,"y":1200}"#).unwrap(),
            Action::Tap { x: 540, y: 1200 }
        );
    }

    #[test]
    fn test_parse_fenced_with_extra_fields() {
        let raw = "```json\n{\"action\":\"open_app\",\"package\":\"com.android.settings\",\"reason\":\"need settings\"}\n```";
        assert_eq!(
            parse_action(raw).unwrap(),
            Action::OpenApp {
                package: "com.android.settings".into()
            }
        );
    }

    #[test]
    fn test_key_aliases_are_normalized() {
        assert_eq!(
            parse_action(r#"{"action":"press_key","key":"Return"}"#).unwrap(),
            Action::PressKey {
                key: KeyCode::Enter
            }
        );
        assert!(matches!(
            parse_action(r#"{"action":"press_key","key":"volume_up"}"#),
            Err(ActorError::Unparseable(_))
        ));
    }

    #[test]
    fn test_unknown_kind_is_unparseable() {
        assert!(matches!(
            parse_action(r#"{"action":"shake","intensity":3}"#),
            Err(ActorError::Unparseable(_))
        ));
    }

    #[test]
    fn test_partial_coordinates_are_unparseable() {
        assert!(matches!(
            parse_action(r#"{"action":"tap","x":540}"#),
            Err(ActorError::Unparseable(_))
        ));
    }

    #[test]
    fn test_prose_is_unparseable() {
        assert!(matches!(
            parse_action("I would tap the settings icon"),
            Err(ActorError::Unparseable(_))
        ));
    }

    #[test]
    fn test_invalid_parameters_are_unparseable() {
        assert!(matches!(
            parse_action(r#"{"action":"deep_link","uri":"app://search?q={query}"}"#),
            Err(ActorError::Unparseable(_))
        ));
    }

    #[test]
    fn test_oversized_wait_is_unparseable() {
        assert!(matches!(
            parse_action(r#"{"action":"wait","ms":18446744073709551615}"#),
            Err(ActorError::Unparseable(_))
        ));
        assert!(matches!(
            parse_action(r#"{"action":"wait","ms":3600000}"#),
            Err(ActorError::Unparseable(_))
        ));
        assert_eq!(
            parse_action(r#"{"action":"wait","ms":1000}"#).unwrap(),
            Action::Wait { ms: 1000 }
        );
    }
}
