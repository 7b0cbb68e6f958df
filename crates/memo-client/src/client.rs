//! Memory service HTTP client.

use std::collections::HashSet;
use std::sync::Arc;

use memo_crypto::{EnvelopeCodec, MemoKeyPair};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::{MemoConfig, API_KEY_HEADER};
use crate::error::{MemoError, RequestError};
use crate::types::{
    ListQuery, ListResponse, MemoryContent, MemoryPage, MemoryView, Metadata, RawMemory,
    RetrievalMode, StoreOutcome, StorePayload, StoreRequest, StoreResponse, MAX_PAGE_SIZE,
};

/// Handle used when the caller gives none.
pub const DEFAULT_HANDLE: &str = "general";

struct Inner {
    http: Client,
    config: MemoConfig,
    codec: EnvelopeCodec,
}

/// Client for the memory service.
///
/// Constructed once at startup. The HTTP session and key pair are
/// read-only afterwards, so clones can be used from any task.
#[derive(Clone)]
pub struct MemoClient {
    inner: Arc<Inner>,
}

impl MemoClient {
    pub fn new(config: MemoConfig, keys: MemoKeyPair) -> Result<Self, MemoError> {
        Self::with_codec(config, EnvelopeCodec::new(keys))
    }

    /// Build a client around an already configured codec.
    pub fn with_codec(config: MemoConfig, codec: EnvelopeCodec) -> Result<Self, MemoError> {
        let mut api_key = HeaderValue::from_str(config.api_key.expose_secret()).map_err(|_| {
            MemoError::InvalidInput("API key contains characters not allowed in a header".into())
        })?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(API_KEY_HEADER), api_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(MemoError::Client)?;

        info!(base_url = %config.base_url, key_bits = codec.keys().bits(), "memory client ready");

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                config,
                codec,
            }),
        })
    }

    pub fn config(&self) -> &MemoConfig {
        &self.inner.config
    }

    pub fn codec(&self) -> &EnvelopeCodec {
        &self.inner.codec
    }

    /// Encrypt and store a memory.
    ///
    /// A 2xx response that names no memory is reported as
    /// [`StoreOutcome::NotSaved`], not as an error.
    pub async fn store(&self, request: StoreRequest) -> Result<StoreOutcome, MemoError> {
        let handle = normalize_handle(&request.handle);
        let content_length = request.content.chars().count();
        debug!(
            handle = %handle,
            content_length,
            description = %request.description,
            "storing memory"
        );

        let ciphertext = self.inner.codec.pack(request.content.as_bytes())?;
        let metadata = request
            .metadata
            .unwrap_or_else(|| default_metadata(content_length, &self.inner.config.source_tag));

        let payload = serde_json::to_value(StorePayload {
            ciphertext: &ciphertext,
            description: &request.description,
            handle: &handle,
            metadata: &metadata,
            idempotent_key: request.idempotent_key.as_deref(),
        })?;

        let url = self.inner.config.memory_url();
        debug!("POST {}", url);

        let response = self
            .inner
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_failure(&url, &payload, e))?;

        let body: Value = read_json(response, &url, &payload).await?;
        debug!("store response: {}", body);

        let saved = serde_json::from_value::<StoreResponse>(body.clone())
            .ok()
            .and_then(StoreResponse::into_saved);

        Ok(match saved {
            Some((memory_id, idempotent_key)) => {
                info!(memory_id = %memory_id, handle = %handle, "memory stored");
                StoreOutcome::Saved {
                    memory_id,
                    idempotent_key,
                    handle,
                }
            }
            None => {
                warn!(handle = %handle, "store response carried no memory id");
                StoreOutcome::NotSaved {
                    handle,
                    response: body,
                }
            }
        })
    }

    /// Fetch one page of memories.
    ///
    /// Records that fail to decrypt come back as
    /// [`MemoryContent::Unreadable`]; they never fail the page.
    pub async fn list(&self, query: &ListQuery) -> Result<MemoryPage, MemoError> {
        let params = query_params(query);
        let payload = Value::Object(
            params
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
                .collect(),
        );

        let url = self.inner.config.memory_url();
        debug!("GET {} {}", url, payload);

        let response = self
            .inner
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| transport_failure(&url, &payload, e))?;

        let body: ListResponse = read_json(response, &url, &payload).await?;
        let next_cursor = body.next_cursor();

        let items = body.data.unwrap_or_default();
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<RawMemory>(item) {
                Ok(raw) => records.push(self.view(raw, query.mode)),
                Err(e) => warn!("skipping malformed memory record: {}", e),
            }
        }

        let page = MemoryPage {
            records,
            next_cursor,
            requested_cursor: query.effective_cursor().map(str::to_string),
        };
        debug!(
            count = page.records.len(),
            unreadable = page.unreadable_count(),
            has_more = page.has_more(),
            "retrieved memories"
        );
        Ok(page)
    }

    /// Follow `next_cursor` until the service reports no more pages.
    ///
    /// Duplicate ids are dropped, and a cursor seen twice ends the walk.
    pub async fn list_all(
        &self,
        handle: Option<&str>,
        mode: RetrievalMode,
        page_size: u32,
    ) -> Result<Vec<MemoryView>, MemoError> {
        let mut query = ListQuery::new().mode(mode).limit(page_size);
        query.handle = handle.map(str::to_string);

        let mut seen_ids = HashSet::new();
        let mut seen_cursors = HashSet::new();
        let mut records = Vec::new();

        loop {
            let page = self.list(&query).await?;
            records.extend(
                page.records
                    .into_iter()
                    .filter(|record| seen_ids.insert(record.id.clone())),
            );

            match page.next_cursor {
                Some(cursor) if seen_cursors.insert(cursor.clone()) => query.cursor = Some(cursor),
                Some(cursor) => {
                    warn!(cursor = %cursor, "service repeated a cursor, stopping");
                    break;
                }
                None => break,
            }
        }

        Ok(records)
    }

    fn view(&self, raw: RawMemory, mode: RetrievalMode) -> MemoryView {
        let content = if mode.includes_content() {
            raw.envelope()
                .map(|ciphertext| self.decrypt_content(&raw.id, ciphertext))
        } else {
            None
        };

        MemoryView {
            description: raw.description.filter(|_| mode.includes_description()),
            content,
            metadata: raw.metadata.unwrap_or_default(),
            id: raw.id,
            handle: raw.handle.unwrap_or_default(),
            idempotent_key: raw.idempotent_key,
            created_at: raw.created_at,
        }
    }

    fn decrypt_content(&self, id: &str, ciphertext: &str) -> MemoryContent {
        let plaintext = match self.inner.codec.unpack(ciphertext) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(memory_id = %id, error = %e, "failed to decrypt memory");
                return MemoryContent::Unreadable {
                    reason: e.to_string(),
                };
            }
        };

        match String::from_utf8(plaintext) {
            Ok(text) => MemoryContent::Text(text),
            Err(_) => {
                warn!(memory_id = %id, "decrypted memory is not valid UTF-8");
                MemoryContent::Unreadable {
                    reason: "decrypted content is not valid UTF-8".to_string(),
                }
            }
        }
    }
}

/// Lowercase, every space becomes a hyphen, `general` when blank.
pub fn normalize_handle(handle: &str) -> String {
    if handle.trim().is_empty() {
        return DEFAULT_HANDLE.to_string();
    }
    handle.replace(' ', "-").to_lowercase()
}

/// Size and provenance, used when the caller supplies no metadata.
pub fn default_metadata(content_length: usize, source_tag: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("token_size".to_string(), json!(content_length));
    metadata.insert("from".to_string(), json!(source_tag));
    metadata
}

fn query_params(query: &ListQuery) -> Vec<(&'static str, String)> {
    let mut params = Vec::with_capacity(5);

    if let Some(handle) = query.handle.as_deref().filter(|h| !h.trim().is_empty()) {
        params.push(("handle", normalize_handle(handle)));
    }
    params.push(("limit", query.limit.clamp(1, MAX_PAGE_SIZE).to_string()));
    if let Some(cursor) = query.effective_cursor() {
        params.push(("cursor", cursor.to_string()));
    }
    params.push((
        "include_description",
        query.mode.includes_description().to_string(),
    ));
    params.push(("include_content", query.mode.includes_content().to_string()));

    params
}

fn transport_failure(url: &str, payload: &Value, err: reqwest::Error) -> MemoError {
    error!("Request failed: {}", err);
    RequestError::transport(url, payload, &err).into()
}

/// Read the body, turning non-2xx statuses and unparseable bodies into
/// a [`RequestError`] with the full response text attached.
async fn read_json<T: DeserializeOwned>(
    response: Response,
    url: &str,
    payload: &Value,
) -> Result<T, MemoError> {
    let status = response.status();
    debug!("Response status: {}", status);

    let text = response
        .text()
        .await
        .map_err(|e| transport_failure(url, payload, e))?;

    if !status.is_success() {
        let detail = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|body| match body.get("error")? {
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .unwrap_or_else(|| text.clone());
        error!("API error {}: {}", status.as_u16(), detail);

        return Err(RequestError {
            message: format!("API error {}: {}", status.as_u16(), detail),
            url: url.to_string(),
            payload: payload.clone(),
            status: Some(status.as_u16()),
            response_text: Some(text),
        }
        .into());
    }

    match serde_json::from_str(&text) {
        Ok(body) => Ok(body),
        Err(e) => {
            error!("Unexpected response body: {}", e);
            Err(RequestError {
                message: format!("Unexpected response from memory service: {e}"),
                url: url.to_string(),
                payload: payload.clone(),
                status: Some(status.as_u16()),
                response_text: Some(text),
            }
            .into())
        }
    }
}
