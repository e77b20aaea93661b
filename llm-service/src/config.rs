//! LLM configuration loaded from environment variables.

use std::env;

/// Connection settings for the chat-completion endpoint.
///
/// All fields come from the environment. When the endpoint or key is absent
/// the service runs with a disabled client and reviews are skipped instead of
/// failed, so `from_env` returns `None` rather than an error.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL, e.g. `https://llm.example.com`.
    pub endpoint: String,
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Deployment name for gateways that route by deployment.
    pub deployment: Option<String>,
    /// Model identifier placed in the request body.
    pub model: String,
    /// Optional API version query parameter (deployment-style gateways).
    pub api_version: Option<String>,
}

impl LlmConfig {
    /// Reads `LLM_ENDPOINT`, `LLM_KEY`, `LLM_DEPLOYMENT`, `LLM_MODEL_NAME`,
    /// and `LLM_API_VERSION`. Returns `None` when the endpoint or key is
    /// missing or empty.
    pub fn from_env() -> Option<Self> {
        let endpoint = non_empty_var("LLM_ENDPOINT")?;
        let api_key = non_empty_var("LLM_KEY")?;
        let deployment = non_empty_var("LLM_DEPLOYMENT");
        let model = non_empty_var("LLM_MODEL_NAME")
            .or_else(|| deployment.clone())
            .unwrap_or_else(|| "gpt-4o".to_string());
        let api_version = non_empty_var("LLM_API_VERSION");

        Some(Self {
            endpoint,
            api_key,
            deployment,
            model,
            api_version,
        })
    }

    /// Resolves the chat-completions URL for this configuration.
    ///
    /// Deployment-style gateways use
    /// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version=...`;
    /// everything else uses the plain `{endpoint}/v1/chat/completions` shape.
    pub fn completions_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        match (&self.deployment, &self.api_version) {
            (Some(deployment), Some(version)) => format!(
                "{base}/openai/deployments/{deployment}/chat/completions?api-version={version}"
            ),
            _ => format!("{base}/v1/chat/completions"),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_endpoint_uses_v1_path() {
        let cfg = LlmConfig {
            endpoint: "https://llm.example.com/".into(),
            api_key: "k".into(),
            deployment: None,
            model: "gpt-4o".into(),
            api_version: None,
        };
        assert_eq!(
            cfg.completions_url(),
            "https://llm.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn deployment_endpoint_routes_by_deployment() {
        let cfg = LlmConfig {
            endpoint: "https://llm.example.com".into(),
            api_key: "k".into(),
            deployment: Some("review-model".into()),
            model: "gpt-4o".into(),
            api_version: Some("2024-08-01".into()),
        };
        assert_eq!(
            cfg.completions_url(),
            "https://llm.example.com/openai/deployments/review-model/chat/completions?api-version=2024-08-01"
        );
    }
}
