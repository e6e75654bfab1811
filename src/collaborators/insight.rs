use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::{json, Value};

use crate::{
    collaborators::{read_success_body, InsightProvider},
    config::InsightConfig,
    error::CollaboratorError,
};

const SERVICE: &str = "openai insights";
const API_VERSION: &str = "2024-08-01-preview";
const SYSTEM_PROMPT: &str = "You are a clinical AI assistant for NeuroTrack X. Analyze the \
following transcript for cognitive risk factors like speech rate, pauses, and vocabulary \
complexity. Return a concise clinical summary.";

pub struct AzureOpenAiInsights {
    client: Client,
    config: InsightConfig,
}

impl AzureOpenAiInsights {
    pub fn new(client: Client, config: InsightConfig) -> Self {
        Self { client, config }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.config.endpoint.trim_end_matches('/'),
            self.config.deployment
        )
    }
}

#[async_trait]
impl InsightProvider for AzureOpenAiInsights {
    async fn insights(&self, transcript: &str) -> Result<String, CollaboratorError> {
        let body = json!({
            "model": self.config.deployment,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": transcript },
            ],
        });

        let response = self
            .client
            .post(self.completions_url())
            .query(&[("api-version", API_VERSION)])
            .header(header::CONTENT_TYPE, "application/json")
            .header("api-key", &self.config.key)
            .json(&body)
            .send()
            .await
            .map_err(|err| CollaboratorError::transient(SERVICE, err))?;

        let body = read_success_body(SERVICE, response).await?;
        let parsed: Value =
            serde_json::from_str(&body).map_err(|err| CollaboratorError::malformed(SERVICE, err))?;
        first_choice_content(&parsed)
    }
}

fn first_choice_content(value: &Value) -> Result<String, CollaboratorError> {
    value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CollaboratorError::malformed(SERVICE, "missing choices[0].message.content"))
}
