//! Client for the reference-library API: paginated item listing per
//! project and note retrieval per item. Pure request/response, no state.
use crate::model::{ItemNote, SourceItem};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tracing::debug;

const SCIWHEEL_API_BASE: &str = "https://sciwheel.com/extapi/work/";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("source returned status {status}")]
    Status { status: StatusCode },
    #[error("invalid source request URL")]
    InvalidUrl,
}

/// Seam between the engine and the real API, so sync logic is testable
/// without network access.
#[async_trait]
pub trait SourceService: Send + Sync {
    /// All items of a project, newest first, every page concatenated.
    async fn list_items(&self, project_id: &str) -> Result<Vec<SourceItem>, SourceError>;

    /// All notes attached to one item.
    async fn list_notes(&self, item_id: &str) -> Result<Vec<ItemNote>, SourceError>;
}

#[derive(Clone)]
pub struct SciwheelClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for SciwheelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SciwheelClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    results: Vec<SourceItem>,
    #[serde(default = "one", rename = "totalPages")]
    total_pages: u32,
}

fn one() -> u32 {
    1
}

impl SciwheelClient {
    pub fn new(token: String) -> Self {
        let base_url = Url::parse(SCIWHEEL_API_BASE).expect("valid default Sciwheel URL");
        Self::with_base_url(token, base_url)
    }

    pub fn with_base_url(token: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("refwatch/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
        }
    }

    pub fn build_list_request(
        &self,
        project_id: &str,
        page: u32,
    ) -> Result<reqwest::Request, SourceError> {
        let endpoint = self
            .base_url
            .join("references")
            .map_err(|_| SourceError::InvalidUrl)?;
        self.http
            .get(endpoint)
            .query(&[
                ("projectId", project_id),
                ("sort", "addedDate:desc"),
                ("page", &page.to_string()),
            ])
            .bearer_auth(&self.token)
            .build()
            .map_err(SourceError::from)
    }

    pub fn build_notes_request(&self, item_id: &str) -> Result<reqwest::Request, SourceError> {
        let endpoint = self
            .base_url
            .join(&format!("references/{item_id}/notes"))
            .map_err(|_| SourceError::InvalidUrl)?;
        self.http
            .get(endpoint)
            .bearer_auth(&self.token)
            .build()
            .map_err(SourceError::from)
    }

    async fn fetch_page(&self, project_id: &str, page: u32) -> Result<ListPage, SourceError> {
        let request = self.build_list_request(project_id, page)?;
        debug!(url = %request.url(), "fetching item page");
        let res = self.http.execute(request).await?;
        if !res.status().is_success() {
            return Err(SourceError::Status {
                status: res.status(),
            });
        }
        Ok(res.json().await?)
    }
}

#[async_trait]
impl SourceService for SciwheelClient {
    async fn list_items(&self, project_id: &str) -> Result<Vec<SourceItem>, SourceError> {
        // Iterative walk bounded by the server-reported page count; the
        // server orders by addedDate descending and we keep that order.
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let body = self.fetch_page(project_id, page).await?;
            let total_pages = body.total_pages.max(1);
            if body.results.is_empty() {
                break;
            }
            items.extend(body.results);
            if page >= total_pages {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    async fn list_notes(&self, item_id: &str) -> Result<Vec<ItemNote>, SourceError> {
        let request = self.build_notes_request(item_id)?;
        debug!(url = %request.url(), "fetching item notes");
        let res = self.http.execute(request).await?;
        if !res.status().is_success() {
            return Err(SourceError::Status {
                status: res.status(),
            });
        }
        Ok(res.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_request_carries_query_and_auth() {
        let client = SciwheelClient::new("sekrit".into());
        let request = client.build_list_request("419191", 3).unwrap();
        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(request.url().path(), "/extapi/work/references");
        let query: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(query.contains(&("projectId".into(), "419191".into())));
        assert!(query.contains(&("sort".into(), "addedDate:desc".into())));
        assert!(query.contains(&("page".into(), "3".into())));
        let auth = request
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .unwrap();
        assert_eq!(auth, "Bearer sekrit");
    }

    #[test]
    fn notes_request_targets_item_path() {
        let client = SciwheelClient::new("sekrit".into());
        let request = client.build_notes_request("987654").unwrap();
        assert_eq!(request.url().path(), "/extapi/work/references/987654/notes");
    }

    #[test]
    fn page_decodes_results_and_total() {
        let page: ListPage = serde_json::from_value(json!({
            "results": [{ "id": 1, "title": "t", "f1000AddedDate": 5 }],
            "totalPages": 4,
        }))
        .unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.total_pages, 4);
    }

    #[test]
    fn page_defaults_when_fields_absent() {
        let page: ListPage = serde_json::from_value(json!({})).unwrap();
        assert!(page.results.is_empty());
        assert_eq!(page.total_pages, 1);
    }
}
