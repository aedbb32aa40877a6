use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::{config::ClassifierConfig, domain::ClassificationResult};

use super::inference::{build_request, parse_response, CHECK_SPAM_PATH};

/// Remote spam scoring. One call per message; there is no batch endpoint.
#[async_trait]
pub trait SpamClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<ClassificationResult>;
}

#[derive(Clone)]
pub struct SnifferClient {
    http: Client,
    endpoint: Url,
    config: ClassifierConfig,
}

impl SnifferClient {
    pub fn new(http: Client, config: ClassifierConfig) -> Result<Self> {
        let endpoint = config
            .base_url
            .join(CHECK_SPAM_PATH)
            .with_context(|| format!("invalid classifier base url {}", config.base_url))?;
        Ok(Self {
            http,
            endpoint,
            config,
        })
    }
}

#[async_trait]
impl SpamClassifier for SnifferClient {
    async fn classify(&self, text: &str) -> Result<ClassificationResult> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .timeout(self.config.timeout)
            .json(&build_request(text))
            .send()
            .await
            .with_context(|| format!("failed to reach classifier at {}", self.endpoint))?
            .error_for_status()?;

        let classification = parse_response(response).await?;
        tracing::trace!(
            target: "classifier",
            is_spam = classification.is_spam,
            score = classification.spam_score,
            "classification received"
        );
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn endpoint_is_resolved_against_base_url() {
        let config = ClassifierConfig {
            base_url: Url::parse("http://classifier.internal:5000/api/").unwrap(),
            timeout: Duration::from_secs(1),
        };
        let client = SnifferClient::new(Client::new(), config).unwrap();
        assert_eq!(
            client.endpoint.as_str(),
            "http://classifier.internal:5000/api/check_spam"
        );
    }
}
