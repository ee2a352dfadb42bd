//! Conductor Recorder
//!
//! Pulls durable facts (confirmation numbers, prices, addresses) out of the
//! latest successful step. The Recorder only produces notes; the orchestrator
//! appends them and nothing else in the workspace changes.

use crate::conductor::prompt::recorder_prompt;
use crate::conductor::workspace::Workspace;
use crate::llm::{extract_json_payload, LLMError, ModelGateway};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct RawNotes {
    #[serde(default)]
    notes: Vec<String>,
}

pub struct Recorder {
    gateway: Arc<ModelGateway>,
}

/// Parse `{"notes": [...]}`; blank notes are dropped
pub fn parse_notes(content: &str) -> Result<Vec<String>, LLMError> {
    let payload = extract_json_payload(content)?;
    let raw: RawNotes = serde_json::from_str(payload)
        .map_err(|e| LLMError::MalformedResponse(format!("notes: {}", e)))?;
    Ok(raw
        .notes
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect())
}

impl Recorder {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn record(&self, ws: &Workspace) -> Result<Vec<String>, LLMError> {
        let prompt = recorder_prompt(ws);
        let content = self.gateway.predict(&prompt).await?;
        let notes = parse_notes(&content)?;
        if !notes.is_empty() {
            tracing::debug!("Recorder extracted {} note(s)", notes.len());
        }
        Ok(notes)
    }
}
