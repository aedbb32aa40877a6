use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, RequestBuilder, Response};
use url::Url;

use super::{
    api::{error_from_status, normalize_message, ListMessagesResponse, ModifyRequest, ProfileResponse},
    gateway::{GatewayError, ListFilter, MailGateway},
};
use crate::{
    auth::{Profile, Session},
    domain::{Message, MessageRef},
};

const MAX_PAGE_SIZE: usize = 500;

/// Gmail REST gateway. Holds no credentials; each call is authorized with the caller's session.
#[derive(Clone)]
pub struct GmailGateway {
    http: Client,
    base: Url,
}

impl GmailGateway {
    pub fn new(http: Client, base: Url) -> Self {
        Self { http, base }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Decode(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, session: &Session, request: RequestBuilder) -> Result<Response, GatewayError> {
        let response = request.bearer_auth(session.access_token()).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        Err(error_from_status(status.as_u16(), retry_after, &body))
    }

    async fn list_page(
        &self,
        session: &Session,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse, GatewayError> {
        let url = self.endpoint(&["messages"])?;
        let mut params = vec![
            ("q", query.to_string()),
            ("maxResults", page_size.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let response = self
            .send(session, self.http.get(url).query(&params))
            .await?;
        response
            .json::<ListMessagesResponse>()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))
    }
}

#[async_trait]
impl MailGateway for GmailGateway {
    async fn profile(&self, session: &Session) -> Result<Profile, GatewayError> {
        let url = self.endpoint(&["profile"])?;
        let response = self.send(session, self.http.get(url)).await?;
        let profile = response
            .json::<ProfileResponse>()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))?;
        Ok(profile.into())
    }

    async fn list_unread(
        &self,
        session: &Session,
        filter: &ListFilter,
    ) -> Result<Vec<MessageRef>, GatewayError> {
        let query = filter.search_query();
        let limit = filter.max_messages.max(1);
        let mut refs: Vec<MessageRef> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page_size = (limit - refs.len()).min(MAX_PAGE_SIZE);
            let page = self
                .list_page(session, &query, page_size, page_token.as_deref())
                .await?;
            refs.extend(page.messages.unwrap_or_default());

            match page.next_page_token {
                Some(token) if refs.len() < limit => page_token = Some(token),
                _ => break,
            }
        }

        refs.truncate(limit);
        tracing::debug!(target: "gmail", query = %query, count = refs.len(), "listed unread messages");
        Ok(refs)
    }

    async fn get_message(&self, session: &Session, id: &str) -> Result<Message, GatewayError> {
        let url = self.endpoint(&["messages", id])?;
        let response = self
            .send(session, self.http.get(url).query(&[("format", "full")]))
            .await?;
        let raw = response
            .json::<serde_json::Value>()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))?;
        normalize_message(raw)
    }

    async fn mark_read(&self, session: &Session, id: &str) -> Result<(), GatewayError> {
        let url = self.endpoint(&["messages", id, "modify"])?;
        self.send(session, self.http.post(url).json(&ModifyRequest::mark_read()))
            .await?;
        tracing::debug!(target: "gmail", id, "message marked as read");
        Ok(())
    }

    async fn trash(&self, session: &Session, id: &str) -> Result<(), GatewayError> {
        let url = self.endpoint(&["messages", id, "trash"])?;
        self.send(session, self.http.post(url)).await?;
        tracing::debug!(target: "gmail", id, "message moved to trash");
        Ok(())
    }
}
