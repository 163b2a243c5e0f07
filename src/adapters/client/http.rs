//! `reqwest` implementation of [`PollReader`] against the poll API.
//!
//! `GET {api}/polls` is paginated (at most 100 per page); `list_polls`
//! walks every page so the baseline is complete.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, PollId};
use crate::domain::poll::{PollView, ViewFilter};
use crate::ports::PollReader;

const PAGE_SIZE: u32 = 100;

/// Errors from the poll API.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Poll API returned {0}")]
    Status(StatusCode),
}

impl From<ReaderError> for DomainError {
    fn from(err: ReaderError) -> Self {
        DomainError::new(ErrorCode::UpstreamUnavailable, err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct PollPage {
    polls: Vec<PollView>,
    #[serde(default)]
    total_pages: u32,
}

pub struct HttpPollReader {
    client: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpPollReader {
    /// `base_url` is the API root, e.g. `http://localhost:8000/api`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ReaderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Read as this user, so viewer fields (own vote, liked) are filled in.
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn fetch_page(&self, filter: &ViewFilter, page: u32) -> Result<PollPage, ReaderError> {
        let mut query = filter.query_pairs();
        query.push(("page", page.to_string()));
        query.push(("page_size", PAGE_SIZE.to_string()));

        let response = self.get("/polls").query(&query).send().await?;
        if !response.status().is_success() {
            return Err(ReaderError::Status(response.status()));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PollReader for HttpPollReader {
    async fn list_polls(&self, filter: &ViewFilter) -> Result<Vec<PollView>, DomainError> {
        let mut polls = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.fetch_page(filter, page).await?;
            polls.extend(batch.polls);
            if page >= batch.total_pages {
                break;
            }
            page += 1;
        }

        tracing::debug!(count = polls.len(), "Fetched poll baseline");
        Ok(polls)
    }

    async fn get_poll(&self, id: PollId) -> Result<Option<PollView>, DomainError> {
        let response = self
            .get(&format!("/polls/{}", id))
            .send()
            .await
            .map_err(ReaderError::from)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let poll = response.json().await.map_err(ReaderError::from)?;
                Ok(Some(poll))
            }
            status => Err(ReaderError::Status(status).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let reader = HttpPollReader::new("http://localhost:8000/api/").unwrap();
        assert_eq!(reader.base_url, "http://localhost:8000/api");
    }

    #[test]
    fn page_deserializes_flat_poll_responses() {
        let json = r#"{
            "polls": [{
                "id": 7, "title": "Lunch?", "description": null,
                "creator_id": 1, "creator_username": "ann",
                "created_at": "2024-05-01T12:00:00",
                "is_active": true,
                "options": [{"id": 71, "text": "Pizza", "position": 0, "vote_count": 2}],
                "total_votes": 2, "total_likes": 1,
                "user_voted": true, "user_liked": false, "user_vote_option_id": 71
            }],
            "total": 1, "page": 1, "page_size": 100, "total_pages": 1
        }"#;

        let page: PollPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.total_pages, 1);
        let poll = &page.polls[0];
        assert_eq!(poll.snapshot.id, PollId::from(7));
        assert_eq!(poll.viewer.user_vote_option_id.map(|o| o.value()), Some(71));
        assert!(poll.viewer.user_voted());
    }

    #[test]
    fn reader_error_maps_to_upstream_unavailable() {
        let err: DomainError = ReaderError::Status(StatusCode::BAD_GATEWAY).into();
        assert_eq!(err.code(), ErrorCode::UpstreamUnavailable);
    }
}
