//! Gmail REST wire types and their conversion into domain values.

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::gateway::GatewayError;
use crate::{
    auth::Profile,
    domain::{Message, MessageRef},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesResponse {
    pub messages: Option<Vec<MessageRef>>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    snippet: Option<String>,
    payload: Option<GmailPayload>,
    internal_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GmailPayload {
    headers: Option<Vec<GmailHeader>>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub email_address: String,
    pub messages_total: Option<u64>,
}

impl From<ProfileResponse> for Profile {
    fn from(value: ProfileResponse) -> Self {
        Profile {
            email_address: value.email_address,
            messages_total: value.messages_total,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub add_label_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remove_label_ids: Vec<String>,
}

impl ModifyRequest {
    pub fn mark_read() -> Self {
        Self {
            add_label_ids: Vec::new(),
            remove_label_ids: vec!["UNREAD".to_string()],
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Maps a non-success response to the gateway taxonomy, keeping the provider's message.
pub fn error_from_status(status: u16, retry_after_secs: Option<u64>, body: &str) -> GatewayError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    match status {
        401 => GatewayError::Unauthorized(message),
        404 => GatewayError::NotFound(message),
        429 => GatewayError::RateLimited { retry_after_secs },
        code => GatewayError::Provider { code, message },
    }
}

pub fn normalize_message(raw: serde_json::Value) -> Result<Message, GatewayError> {
    let parsed: GmailMessage =
        serde_json::from_value(raw.clone()).map_err(|err| GatewayError::Decode(err.to_string()))?;

    let headers = parsed
        .payload
        .as_ref()
        .and_then(|payload| payload.headers.as_deref())
        .unwrap_or_default();

    Ok(Message {
        from: header(headers, "From").unwrap_or_default(),
        subject: header(headers, "Subject").unwrap_or_default(),
        snippet: decode_html_entities(parsed.snippet.as_deref().unwrap_or_default()),
        received_at: parsed.internal_date.as_deref().and_then(parse_internal_date),
        id: parsed.id,
        raw,
    })
}

fn header(headers: &[GmailHeader], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.trim().to_string())
}

fn parse_internal_date(value: &str) -> Option<DateTime<Utc>> {
    let millis = value.parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

static ENTITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:#(\d{1,7})|#[xX]([0-9a-fA-F]{1,6})|(amp|lt|gt|quot|apos|nbsp));")
        .expect("valid entity regex")
});

/// Gmail snippets arrive HTML-escaped.
pub fn decode_html_entities(text: &str) -> String {
    ENTITY_REGEX
        .replace_all(text, |caps: &Captures<'_>| {
            let decoded = if let Some(dec) = caps.get(1) {
                dec.as_str().parse::<u32>().ok().and_then(char::from_u32)
            } else if let Some(hex) = caps.get(2) {
                u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32)
            } else {
                caps.get(3).map(|named| match named.as_str() {
                    "amp" => '&',
                    "lt" => '<',
                    "gt" => '>',
                    "quot" => '"',
                    "apos" => '\'',
                    _ => ' ',
                })
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn normalizes_full_format_message() {
        let raw = json!({
            "id": "18c1",
            "threadId": "18c0",
            "labelIds": ["UNREAD", "INBOX"],
            "snippet": "Don&#39;t miss our &quot;sale&quot; &amp; more",
            "internalDate": "1700000000000",
            "payload": {
                "headers": [
                    {"name": "from", "value": "Shop <deals@shop.example>"},
                    {"name": "Subject", "value": " 50% off "}
                ]
            }
        });

        let message = normalize_message(raw.clone()).unwrap();
        assert_eq!(message.id, "18c1");
        assert_eq!(message.from, "Shop <deals@shop.example>");
        assert_eq!(message.subject, "50% off");
        assert_eq!(message.snippet, "Don't miss our \"sale\" & more");
        assert_eq!(
            message.received_at.map(|ts| ts.timestamp()),
            Some(1_700_000_000)
        );
        assert_eq!(message.raw, raw);
    }

    #[test]
    fn missing_headers_become_empty_strings() {
        let message = normalize_message(json!({"id": "x"})).unwrap();
        assert_eq!(message.from, "");
        assert_eq!(message.subject, "");
        assert_eq!(message.snippet, "");
        assert!(message.received_at.is_none());
    }

    #[test]
    fn message_without_id_is_a_decode_error() {
        let err = normalize_message(json!({"snippet": "hi"})).unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));
    }

    #[test]
    fn error_status_mapping_keeps_provider_message() {
        let body = r#"{"error":{"code":400,"message":"Invalid id value","status":"INVALID_ARGUMENT"}}"#;
        match error_from_status(400, None, body) {
            GatewayError::Provider { code, message } => {
                assert_eq!(code, 400);
                assert_eq!(message, "Invalid id value");
            }
            other => panic!("unexpected error {other:?}"),
        }

        assert!(error_from_status(401, None, "{}").is_unauthorized());
        assert!(error_from_status(404, None, "not here").is_not_found());
        assert!(matches!(
            error_from_status(429, Some(3), ""),
            GatewayError::RateLimited {
                retry_after_secs: Some(3)
            }
        ));
    }

    #[test]
    fn list_page_ignores_fields_it_does_not_use() {
        let page: ListMessagesResponse = serde_json::from_value(json!({
            "messages": [{"id": "a", "threadId": "t1"}, {"id": "b", "threadId": "t2"}],
            "nextPageToken": "page-2",
            "resultSizeEstimate": 201
        }))
        .unwrap();
        assert_eq!(
            page.messages.unwrap(),
            vec![MessageRef::new("a"), MessageRef::new("b")]
        );
        assert_eq!(page.next_page_token.as_deref(), Some("page-2"));

        let empty: ListMessagesResponse = serde_json::from_value(json!({"resultSizeEstimate": 0})).unwrap();
        assert!(empty.messages.is_none());
    }

    #[test]
    fn unknown_entities_are_left_alone() {
        assert_eq!(decode_html_entities("a &bogus; b &#x41;"), "a &bogus; b A");
    }

    #[test]
    fn modify_request_only_removes_unread() {
        let body = serde_json::to_value(ModifyRequest::mark_read()).unwrap();
        assert_eq!(body, json!({"removeLabelIds": ["UNREAD"]}));
    }
}
