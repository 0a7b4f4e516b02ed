//! JSON-over-HTTP destination adapter.
//!
//! Wire contract (all bodies JSON, bearer auth):
//! - `POST   {endpoint}/items`              create, answers `{ "id", "container_id"?, "container_created"? }`
//! - `PUT    {endpoint}/items/{id}`         update in place, same answer
//! - `DELETE {endpoint}/items/{id}`
//! - `GET    {endpoint}/items?content_hash=` 200 `{ "id" }` or 404
//! - `GET    {endpoint}/info`               `{ "connected", "capabilities", "details" }`
//!
//! 429 and 5xx answers become `Retry` results; other 4xx answers are
//! rejections.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use sync_config_and_utils::DestinationEndpoint;
use sync_core::{
    AdapterError, AdapterResult, DestinationAdapter, ItemKind, SyncItem, SyncResult, TargetInfo,
    METADATA_CONTAINER_CREATED, METADATA_CONTAINER_ID,
};
use tracing::debug;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct ItemPayload<'a> {
    owner_id: &'a str,
    item_kind: ItemKind,
    item_id: &'a str,
    content_hash: Option<&'a str>,
    source_table: &'a str,
    page_identity: Option<&'a str>,
    collection_identity: Option<&'a str>,
    sequence_number: Option<i64>,
    container_id: Option<&'a str>,
    data: &'a serde_json::Value,
}

impl<'a> From<&'a SyncItem> for ItemPayload<'a> {
    fn from(item: &'a SyncItem) -> Self {
        Self {
            owner_id: &item.owner_id,
            item_kind: item.item_kind,
            item_id: &item.item_id,
            content_hash: item.content_hash.as_deref(),
            source_table: &item.source_table,
            page_identity: item.page_identity.as_deref(),
            collection_identity: item.collection_identity.as_deref(),
            sequence_number: item.sequence_number,
            container_id: item.existing_container_id.as_deref(),
            data: &item.data,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ItemResponse {
    id: String,
    #[serde(default)]
    container_id: Option<String>,
    #[serde(default)]
    container_created: bool,
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    #[serde(default = "connected_default")]
    connected: bool,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default)]
    details: serde_json::Map<String, serde_json::Value>,
}

fn connected_default() -> bool {
    true
}

/// Destination reached over a small JSON HTTP API.
pub struct HttpDestinationAdapter {
    name: String,
    base_url: Url,
    default_token: Option<String>,
    client: Client,
}

impl HttpDestinationAdapter {
    pub fn new(
        name: impl Into<String>,
        base_url: Url,
        default_token: Option<String>,
    ) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            name: name.into(),
            base_url,
            default_token,
            client,
        })
    }

    /// Build an adapter from a configured endpoint.
    pub fn from_endpoint(endpoint: &DestinationEndpoint) -> anyhow::Result<Self> {
        Ok(Self::new(
            endpoint.name.clone(),
            endpoint.url()?,
            endpoint.auth_token.clone(),
        )?)
    }

    fn url(&self, segments: &[&str]) -> AdapterResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AdapterError::InvalidItem(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, token: Option<&str>) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("X-Request-Id", uuid::Uuid::new_v4().to_string());
        match token.or(self.default_token.as_deref()) {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> AdapterResult<Response> {
        builder
            .send()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))
    }

    async fn write_item(
        &self,
        method: Method,
        url: Url,
        item: &SyncItem,
    ) -> AdapterResult<SyncResult> {
        debug!(
            destination = %self.name,
            method = %method,
            url = %url,
            item_kind = %item.item_kind,
            item_id = %item.item_id,
            "Sending item"
        );

        let token = item.credentials.as_ref().map(|c| c.expose());
        let response = self
            .send(self.request(method, url, token).json(&ItemPayload::from(item)))
            .await?;

        let status = response.status();
        let retry_after = retry_after(&response);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return classify_failure(status, retry_after, body);
        }

        let body: ItemResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        Ok(item_result(body))
    }
}

#[async_trait]
impl DestinationAdapter for HttpDestinationAdapter {
    async fn sync_item(&self, item: &SyncItem) -> AdapterResult<SyncResult> {
        match item.existing_destination_id.as_deref() {
            Some(id) => self.update_item(id, item).await,
            None => self.write_item(Method::POST, self.url(&["items"])?, item).await,
        }
    }

    async fn check_duplicate(&self, content_hash: &str) -> AdapterResult<Option<String>> {
        let mut url = self.url(&["items"])?;
        url.query_pairs_mut().append_pair("content_hash", content_hash);

        let response = self.send(self.request(Method::GET, url, None)).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: ItemResponse = response
                    .json()
                    .await
                    .map_err(|e| AdapterError::Transport(e.to_string()))?;
                Ok(Some(body.id))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(rejection(status, body))
            }
        }
    }

    async fn update_item(&self, destination_id: &str, item: &SyncItem) -> AdapterResult<SyncResult> {
        self.write_item(Method::PUT, self.url(&["items", destination_id])?, item)
            .await
    }

    async fn delete_item(&self, destination_id: &str) -> AdapterResult<SyncResult> {
        let url = self.url(&["items", destination_id])?;
        let response = self.send(self.request(Method::DELETE, url, None)).await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(SyncResult::success(destination_id));
        }
        let retry_after = retry_after(&response);
        let body = response.text().await.unwrap_or_default();
        classify_failure(status, retry_after, body)
    }

    async fn get_target_info(&self) -> AdapterResult<TargetInfo> {
        let response = self
            .send(self.request(Method::GET, self.url(&["info"])?, None))
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(rejection(status, body));
        }

        let info: InfoResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        Ok(TargetInfo {
            name: self.name.clone(),
            connected: info.connected,
            capabilities: info.capabilities,
            details: info.details,
        })
    }
}

fn item_result(body: ItemResponse) -> SyncResult {
    let mut result = SyncResult::success(body.id);
    if let Some(container_id) = body.container_id {
        result = result.with_metadata(METADATA_CONTAINER_ID, serde_json::Value::String(container_id));
    }
    if body.container_created {
        result = result.with_metadata(METADATA_CONTAINER_CREATED, serde_json::Value::Bool(true));
    }
    result
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn rejection(status: StatusCode, body: String) -> AdapterError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AdapterError::Auth(format!("HTTP {}: {}", status, body))
        }
        _ => AdapterError::Rejected {
            status: status.as_u16(),
            message: body,
        },
    }
}

/// Map a non-2xx answer to a retry signal or an error.
fn classify_failure(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: String,
) -> AdapterResult<SyncResult> {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Ok(SyncResult::retry(format!("HTTP {}: {}", status, body), retry_after));
    }
    Err(rejection(status, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sync_core::{Credentials, SyncStatus};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request.
    async fn serve_once(response: &'static str) -> (Url, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let lower = line.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });
        let url = Url::parse(&format!("http://{}/api/", addr)).unwrap();
        (url, task)
    }

    fn page_item() -> SyncItem {
        SyncItem::new(
            "owner-1",
            ItemKind::PageText,
            "p1",
            json!({ "collection_identity": "nb-1", "sequence_number": 1, "text": "hi" }),
        )
        .with_content_hash("abc")
        .with_page("p1", "nb-1", 1)
    }

    #[test]
    fn urls_are_joined_under_the_base_path() {
        let adapter = HttpDestinationAdapter::new(
            "notes",
            Url::parse("https://notes.example/api/v1").unwrap(),
            None,
        )
        .unwrap();
        assert_eq!(
            adapter.url(&["items", "ext 1"]).unwrap().as_str(),
            "https://notes.example/api/v1/items/ext%201"
        );
    }

    #[test]
    fn server_errors_and_throttling_become_retry() {
        let throttled =
            classify_failure(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(7)), "slow".into())
                .unwrap();
        assert!(throttled.should_retry());
        assert_eq!(throttled.retry_after, Some(Duration::from_secs(7)));

        let unavailable =
            classify_failure(StatusCode::SERVICE_UNAVAILABLE, None, String::new()).unwrap();
        assert_eq!(unavailable.status, SyncStatus::Retry);
    }

    #[test]
    fn client_errors_are_rejections() {
        let err = classify_failure(StatusCode::UNPROCESSABLE_ENTITY, None, "bad".into()).unwrap_err();
        assert!(matches!(err, AdapterError::Rejected { status: 422, .. }));

        let err = classify_failure(StatusCode::UNAUTHORIZED, None, String::new()).unwrap_err();
        assert!(matches!(err, AdapterError::Auth(_)));
    }

    #[test]
    fn container_fields_map_to_metadata() {
        let result = item_result(ItemResponse {
            id: "ext1".into(),
            container_id: Some("db-1".into()),
            container_created: true,
        });
        assert_eq!(result.destination_id.as_deref(), Some("ext1"));
        assert_eq!(result.container_id(), Some("db-1"));
        assert!(result.container_created());
    }

    #[tokio::test]
    async fn new_item_is_posted_with_item_credentials() {
        let (url, server) = serve_once(
            "HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nContent-Length: 13\r\nConnection: close\r\n\r\n{\"id\":\"ext1\"}",
        )
        .await;
        let adapter = HttpDestinationAdapter::new("notes", url, Some("fallback".into())).unwrap();
        let mut item = page_item();
        item.credentials = Some(Credentials::new("owner-token"));

        let result = adapter.sync_item(&item).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.destination_id.as_deref(), Some("ext1"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/items "));
        assert!(request.contains("Bearer owner-token"));
        assert!(request.contains("\"content_hash\":\"abc\""));
    }

    #[tokio::test]
    async fn known_item_is_updated_in_place() {
        let (url, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 13\r\nConnection: close\r\n\r\n{\"id\":\"ext1\"}",
        )
        .await;
        let adapter = HttpDestinationAdapter::new("notes", url, Some("fallback".into())).unwrap();
        let item = page_item().with_existing_ids(Some("ext1".into()), Some("db-1".into()));

        adapter.sync_item(&item).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /api/items/ext1 "));
        assert!(request.contains("Bearer fallback"));
        assert!(request.contains("\"container_id\":\"db-1\""));
    }

    #[tokio::test]
    async fn unreachable_destination_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let adapter = HttpDestinationAdapter::new(
            "notes",
            Url::parse(&format!("http://{}/", addr)).unwrap(),
            None,
        )
        .unwrap();
        let err = adapter.sync_item(&page_item()).await.unwrap_err();
        assert!(matches!(err, AdapterError::Transport(_)));
        assert!(!adapter.validate_connection().await);
    }
}
