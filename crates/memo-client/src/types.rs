//! Request, response and record types for the memory service.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::MemoError;

/// Open-ended memory metadata.
pub type Metadata = serde_json::Map<String, Value>;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Which fields a retrieval returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Description without content.
    Summary,
    /// Identifiers and metadata only.
    Metadata,
    /// Everything, content decrypted.
    #[default]
    Full,
}

impl RetrievalMode {
    pub const ALL: [RetrievalMode; 3] = [Self::Summary, Self::Metadata, Self::Full];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Metadata => "metadata",
            Self::Full => "full",
        }
    }

    pub fn includes_description(self) -> bool {
        !matches!(self, Self::Metadata)
    }

    pub fn includes_content(self) -> bool {
        matches!(self, Self::Full)
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalMode {
    type Err = MemoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                MemoError::InvalidInput(format!(
                    "Invalid mode '{s}': expected one of summary, metadata, full"
                ))
            })
    }
}

/// A memory to store.
#[derive(Debug, Clone, Default)]
pub struct StoreRequest {
    pub content: String,
    /// Normalised before sending; blank becomes `general`.
    pub handle: String,
    pub description: String,
    /// `None` lets the client fill in size and provenance. `Some`, even
    /// empty, is sent exactly as given.
    pub metadata: Option<Metadata>,
    /// Reuse a previous store's token to update instead of duplicating.
    pub idempotent_key: Option<String>,
}

impl StoreRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = handle.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn idempotent_key(mut self, key: impl Into<String>) -> Self {
        self.idempotent_key = Some(key.into());
        self
    }
}

/// JSON body of `POST /api/v1/memory`.
#[derive(Debug, Serialize)]
pub(crate) struct StorePayload<'a> {
    pub ciphertext: &'a str,
    pub description: &'a str,
    pub handle: &'a str,
    pub metadata: &'a Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotent_key: Option<&'a str>,
}

/// The two success shapes the service answers a store with.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum StoreResponse {
    Direct {
        #[serde(deserialize_with = "id_string")]
        memory_id: String,
        #[serde(default)]
        idempotent_key: Option<String>,
    },
    Listed {
        data: Vec<StoredItem>,
    },
}

#[derive(Debug, Deserialize)]
pub(crate) struct StoredItem {
    #[serde(deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    idempotent_key: Option<String>,
}

impl StoreResponse {
    /// `(memory_id, idempotent_key)` if the response names a stored memory.
    pub(crate) fn into_saved(self) -> Option<(String, Option<String>)> {
        let saved = match self {
            StoreResponse::Direct {
                memory_id,
                idempotent_key,
            } => Some((memory_id, idempotent_key)),
            StoreResponse::Listed { data } => data
                .into_iter()
                .next()
                .map(|item| (item.id, item.idempotent_key)),
        };
        saved.filter(|(id, _)| !id.is_empty())
    }
}

/// Result of a store call. `NotSaved` is a soft failure: the service
/// answered 2xx but never named the memory it stored.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    Saved {
        memory_id: String,
        idempotent_key: Option<String>,
        handle: String,
    },
    NotSaved {
        handle: String,
        response: Value,
    },
}

impl StoreOutcome {
    pub fn memory_id(&self) -> Option<&str> {
        match self {
            StoreOutcome::Saved { memory_id, .. } => Some(memory_id),
            StoreOutcome::NotSaved { .. } => None,
        }
    }

    pub fn handle(&self) -> &str {
        match self {
            StoreOutcome::Saved { handle, .. } | StoreOutcome::NotSaved { handle, .. } => handle,
        }
    }
}

/// Parameters for one page of `GET /api/v1/memory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// `None` lists across all handles.
    pub handle: Option<String>,
    pub limit: u32,
    pub cursor: Option<String>,
    pub mode: RetrievalMode,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            handle: None,
            limit: DEFAULT_PAGE_SIZE,
            cursor: None,
            mode: RetrievalMode::Full,
        }
    }
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn mode(mut self, mode: RetrievalMode) -> Self {
        self.mode = mode;
        self
    }

    /// Cursor actually sent; blank counts as none.
    pub fn effective_cursor(&self) -> Option<&str> {
        self.cursor.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

/// Body of a retrieval response.
#[derive(Debug, Deserialize)]
pub(crate) struct ListResponse {
    #[serde(default)]
    pub data: Option<Vec<Value>>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Pagination {
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl ListResponse {
    pub(crate) fn next_cursor(&self) -> Option<String> {
        self.next_cursor
            .as_deref()
            .or_else(|| self.pagination.as_ref()?.next_cursor.as_deref())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    }
}

/// A stored memory as the service returns it.
#[derive(Debug, Deserialize)]
pub(crate) struct RawMemory {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub handle: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: Option<String>,
    /// Some backends echo the stored field name instead of `content`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub ciphertext: Option<String>,
    #[serde(default, deserialize_with = "lenient_metadata")]
    pub metadata: Option<Metadata>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub idempotent_key: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl RawMemory {
    /// The stored envelope, from `content` or else `ciphertext`.
    pub(crate) fn envelope(&self) -> Option<&str> {
        [self.content.as_deref(), self.ciphertext.as_deref()]
            .into_iter()
            .flatten()
            .find(|c| !c.is_empty())
    }
}

/// Decrypted content of a retrieved memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryContent {
    Text(String),
    /// The envelope could not be opened; the rest of the page is unaffected.
    Unreadable { reason: String },
}

impl MemoryContent {
    pub fn text(&self) -> Option<&str> {
        match self {
            MemoryContent::Text(text) => Some(text),
            MemoryContent::Unreadable { .. } => None,
        }
    }
}

/// A retrieved memory, shaped by the [`RetrievalMode`] it was fetched with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryView {
    pub id: String,
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MemoryContent>,
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotent_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl MemoryView {
    pub fn is_unreadable(&self) -> bool {
        matches!(self.content, Some(MemoryContent::Unreadable { .. }))
    }
}

/// One page of retrieved memories.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPage {
    pub records: Vec<MemoryView>,
    /// `None` once the last page has been returned.
    pub next_cursor: Option<String>,
    /// The cursor this page was requested with.
    pub requested_cursor: Option<String>,
}

impl MemoryPage {
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }

    /// An empty page reached through a cursor usually means the caller
    /// walked off the end of the results.
    pub fn is_past_end(&self) -> bool {
        self.records.is_empty() && self.requested_cursor.is_some()
    }

    pub fn unreadable_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_unreadable()).count()
    }
}

/// Identifiers arrive as strings or numbers depending on the backend.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Strings pass through, numbers are stringified, anything else is absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_metadata<'de, D>(deserializer: D) -> Result<Option<Metadata>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => Some(map),
        _ => None,
    })
}

/// An unparseable timestamp should not cost the whole record.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}
