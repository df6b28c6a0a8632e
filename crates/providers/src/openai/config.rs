use std::{env, time::Duration};

use gptcli_core::config::ApiSettings;
use gptcli_core::llm::ChatWire;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY not set")]
    MissingApiKey,
    #[error("invalid base url {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub wire_api: ChatWire,
    pub timeout: Duration,
    pub stream_max_retries: u32,
    pub stream_idle_timeout: Duration,
    pub proxy: Option<String>,
}

impl OpenAiConfig {
    /// `OPENAI_API_KEY` is required; `OPENAI_BASE_URL` overrides the
    /// configured base url; `HTTPS_PROXY`/`HTTP_PROXY` set a proxy.
    pub fn from_env(api: &ApiSettings) -> Result<Self, ConfigError> {
        let proxy = env::var("HTTPS_PROXY")
            .ok()
            .or_else(|| env::var("HTTP_PROXY").ok());
        Self::from_parts(
            env::var("OPENAI_API_KEY").ok(),
            env::var("OPENAI_BASE_URL").ok(),
            proxy,
            api,
        )
    }

    pub fn from_parts(
        api_key: Option<String>,
        base_url: Option<String>,
        proxy: Option<String>,
        api: &ApiSettings,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        let base_url = base_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| api.base_url.clone());
        let base_url = validate_base_url(base_url.trim())?;

        Ok(OpenAiConfig {
            api_key,
            base_url,
            wire_api: ChatWire::parse(&api.wire_api),
            timeout: Duration::from_millis(api.timeout_ms),
            stream_max_retries: api.stream_max_retries,
            stream_idle_timeout: Duration::from_millis(api.stream_idle_timeout_ms),
            proxy: proxy.filter(|p| !p.trim().is_empty()),
        })
    }
}

fn validate_base_url(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {}", other))),
    }
    Ok(raw.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_api_key() {
        let api = ApiSettings::default();
        let err = OpenAiConfig::from_parts(None, None, None, &api).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
        let err = OpenAiConfig::from_parts(Some("  ".into()), None, None, &api).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
    }

    #[test]
    fn env_base_url_overrides_settings() {
        let api = ApiSettings::default();
        let cfg = OpenAiConfig::from_parts(Some("sk-test".into()), None, None, &api).unwrap();
        assert_eq!(cfg.base_url, "https://api.openai.com/v1");
        assert_eq!(cfg.wire_api, ChatWire::Responses);
        assert_eq!(cfg.stream_max_retries, 5);

        let cfg = OpenAiConfig::from_parts(
            Some("sk-test".into()),
            Some("http://localhost:8080/v1/".into()),
            Some("http://proxy:3128".into()),
            &api,
        )
        .unwrap();
        assert_eq!(cfg.base_url, "http://localhost:8080/v1");
        assert_eq!(cfg.proxy.as_deref(), Some("http://proxy:3128"));
    }

    #[test]
    fn rejects_bad_base_url() {
        let api = ApiSettings::default();
        for bad in ["not a url", "ftp://example.com"] {
            let err =
                OpenAiConfig::from_parts(Some("k".into()), Some(bad.into()), None, &api).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }), "{}", bad);
        }
    }
}
