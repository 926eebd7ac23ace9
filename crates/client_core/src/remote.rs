use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use shared::{
    error::ApiError,
    protocol::{
        ChangeNotice, ChangesResponse, PutDocumentRequest, PutDocumentResponse,
        ReplicateResponse, Revision, StoredDocument,
    },
};
use storage::{DocumentStore, StoreError};
use tokio::sync::broadcast;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

const NOTICE_CAPACITY: usize = 256;

/// One database on a remote replication endpoint, spoken to over HTTP with
/// a WebSocket change feed.
#[derive(Clone)]
pub struct RemoteStore {
    http: Client,
    base_url: Url,
    name: String,
}

impl RemoteStore {
    pub fn new(server_url: &str, name: impl Into<String>) -> Result<Self, StoreError> {
        let base_url = Url::parse(server_url.trim())
            .map_err(|err| StoreError::Remote(format!("invalid server url '{server_url}': {err}")))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(StoreError::Remote(format!(
                "server url must start with http:// or https://: {server_url}"
            )));
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            name: name.into(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("db").push(&self.name).extend(segments);
        }
        url
    }

    fn ws_endpoint(&self) -> Result<Url, StoreError> {
        let mut url = self.endpoint(&["ws"]);
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| StoreError::Remote(format!("cannot derive websocket url from {url}")))?;
        Ok(url)
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_connect() || err.is_timeout() {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Remote(err.to_string())
    }
}

async fn error_from_response(response: Response, id: &str) -> StoreError {
    let status = response.status();
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound { id: id.to_string() },
        StatusCode::CONFLICT => StoreError::Conflict { id: id.to_string() },
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
            StoreError::Unavailable(format!("remote returned {status}"))
        }
        _ => {
            let message = match response.json::<ApiError>().await {
                Ok(body) => body.message,
                Err(_) => "no error body".to_string(),
            };
            StoreError::Remote(format!("{status}: {message}"))
        }
    }
}

#[async_trait]
impl DocumentStore for RemoteStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, id: &str) -> Result<StoredDocument, StoreError> {
        let response = self
            .http
            .get(self.endpoint(&["docs", id]))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response, id).await);
        }
        response.json().await.map_err(transport_error)
    }

    async fn put(
        &self,
        id: &str,
        payload: &serde_json::Value,
        rev: Option<&Revision>,
    ) -> Result<Revision, StoreError> {
        let response = self
            .http
            .put(self.endpoint(&["docs", id]))
            .json(&PutDocumentRequest {
                payload: payload.clone(),
                rev: rev.cloned(),
            })
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response, id).await);
        }
        let body: PutDocumentResponse = response.json().await.map_err(transport_error)?;
        Ok(body.rev)
    }

    async fn changes_since(&self, since: i64) -> Result<ChangesResponse, StoreError> {
        let response = self
            .http
            .get(self.endpoint(&["changes"]))
            .query(&[("since", since)])
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response, "_changes").await);
        }
        response.json().await.map_err(transport_error)
    }

    async fn apply_replicated(&self, document: &StoredDocument) -> Result<bool, StoreError> {
        let response = self
            .http
            .post(self.endpoint(&["replicate"]))
            .json(document)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response, &document.id).await);
        }
        let body: ReplicateResponse = response.json().await.map_err(transport_error)?;
        Ok(body.applied)
    }

    /// Opens the change feed; the receiver closes when the socket does.
    async fn watch(&self) -> Result<broadcast::Receiver<ChangeNotice>, StoreError> {
        let ws_url = self.ws_endpoint()?;
        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|err| StoreError::Unavailable(format!("change feed {ws_url}: {err}")))?;
        let (_, mut ws_reader) = ws_stream.split();
        let (notices, receiver) = broadcast::channel(NOTICE_CAPACITY);
        let db = self.name.clone();

        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ChangeNotice>(&text) {
                        Ok(notice) => {
                            if notices.send(notice).is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(%db, %err, "invalid change notice"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        debug!(%db, %err, "change feed receive failed");
                        break;
                    }
                }
            }
            debug!(%db, "change feed closed");
        });

        Ok(receiver)
    }
}
