use anyhow::{ensure, Context, Result};
use reqwest::Response;
use serde::{Deserialize, Serialize};

use crate::domain::ClassificationResult;

pub const CHECK_SPAM_PATH: &str = "check_spam";

pub fn build_request(text: &str) -> CheckSpamRequest<'_> {
    CheckSpamRequest { text }
}

pub async fn parse_response(response: Response) -> Result<ClassificationResult> {
    let body = response
        .text()
        .await
        .context("failed to read classifier response body")?;
    parse_body(&body)
}

pub fn parse_body(body: &str) -> Result<ClassificationResult> {
    let verdict: CheckSpamResponse =
        serde_json::from_str(body).context("classifier returned malformed JSON")?;
    ensure!(
        verdict.spam_score.is_finite(),
        "classifier returned a non-finite spam score"
    );

    Ok(ClassificationResult {
        is_spam: verdict.is_spam,
        spam_score: verdict.spam_score,
        description: verdict.description.unwrap_or_default(),
        summary: verdict.summary.unwrap_or_default(),
        spam_type: verdict.spam_type.filter(|v| !v.is_empty()),
    })
}

#[derive(Debug, Serialize)]
pub struct CheckSpamRequest<'a> {
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct CheckSpamResponse {
    pub is_spam: bool,
    pub spam_score: f64,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub spam_type: Option<String>,
}
