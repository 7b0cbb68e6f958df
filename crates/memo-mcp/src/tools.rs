//! Tool definitions and execution
//!
//! `save_memory` and `load_memories` are the two operations exposed to the
//! agent. Both always answer with text: service failures become readable
//! messages, never protocol errors.

use memo_client::{
    ListQuery, MemoClient, MemoError, MemoryContent, MemoryPage, MemoryView, RetrievalMode,
    StoreOutcome, StoreRequest, DEFAULT_HANDLE, DEFAULT_PAGE_SIZE,
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info};

pub const SAVE_MEMORY: &str = "save_memory";
pub const LOAD_MEMORIES: &str = "load_memories";

/// Rejections that happen before a tool runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: &'static str, reason: String },
}

/// Tool schemas in the shape `tools/list` returns them.
pub fn tool_schemas() -> Vec<Value> {
    vec![
        json!({
            "name": SAVE_MEMORY,
            "description": "Store important information as a permanent memory. Call this proactively when you detect user preferences, important decisions, reusable logic, or context worth recalling later, not only when the user explicitly says \"remember\" or \"save\".",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "The text to remember. Be concise but keep the context." },
                    "handle": { "type": "string", "description": "A short category or tag, e.g. 'work', 'personal', 'project-x'. Defaults to 'general'." },
                    "description": { "type": "string", "description": "A brief, non-sensitive summary that helps identify this memory later." },
                    "idempotent_key": { "type": "string", "description": "The 'Idempotent key' reported by an earlier save or load. Supplying it updates that memory instead of creating a new one." }
                },
                "required": ["content"]
            }
        }),
        json!({
            "name": LOAD_MEMORIES,
            "description": "Retrieve previously stored memories. Call this when the user asks what you remember, or when you need historical context such as preferences, past decisions or project details.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "handle": { "type": "string", "description": "Only load memories under this handle. Omit to load across all handles." },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 100, "description": "Page size (default 20)." },
                    "cursor": { "type": "string", "description": "The 'Next cursor' value from a previous call, to fetch the following page." },
                    "mode": {
                        "type": "string",
                        "enum": ["summary", "metadata", "full"],
                        "description": "summary: descriptions only; metadata: handles and metadata only; full: decrypted content (default)."
                    }
                }
            }
        }),
    ]
}

/// Executes the memory tools against one client.
#[derive(Clone)]
pub struct MemoryTools {
    client: MemoClient,
    debug: bool,
}

impl MemoryTools {
    pub fn new(client: MemoClient, debug: bool) -> Self {
        Self { client, debug }
    }

    pub fn client(&self) -> &MemoClient {
        &self.client
    }

    pub async fn execute(&self, name: &str, args: &Value) -> Result<String, ToolError> {
        match name {
            SAVE_MEMORY => Ok(self.save_memory(SaveArgs::parse(args)?).await),
            LOAD_MEMORIES => Ok(self.load_memories(LoadArgs::parse(args)?).await),
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    async fn save_memory(&self, args: SaveArgs) -> String {
        debug!(
            "save_memory called: handle={}, description={}, content_length={}",
            args.handle,
            args.description,
            args.content.chars().count()
        );

        let mut request = StoreRequest::new(args.content.as_str())
            .handle(args.handle.as_str())
            .description(args.description.as_str());
        if let Some(key) = &args.idempotent_key {
            request = request.idempotent_key(key.as_str());
        }

        match self.client.store(request).await {
            Ok(StoreOutcome::Saved {
                memory_id,
                idempotent_key,
                ..
            }) => saved_message(&memory_id, idempotent_key.as_deref()),
            Ok(StoreOutcome::NotSaved { handle, .. }) => {
                format!("Failed to save memory for handle: {handle}")
            }
            Err(e) => {
                error!("Error saving memory: {}", e);
                match e.request() {
                    Some(request) if self.debug => save_diagnostic(request, &args),
                    _ => format!("Failed to save your memory: {e}"),
                }
            }
        }
    }

    async fn load_memories(&self, args: LoadArgs) -> String {
        debug!(
            "load_memories called: handle={:?}, limit={}, cursor={:?}, mode={}",
            args.handle, args.limit, args.cursor, args.mode
        );

        // Reject a bad mode before anything reaches the network.
        let mode: RetrievalMode = match args.mode.parse() {
            Ok(mode) => mode,
            Err(MemoError::InvalidInput(msg)) => return msg,
            Err(e) => return e.to_string(),
        };

        let mut query = ListQuery::new().limit(args.limit).mode(mode);
        query.handle = args.handle.clone();
        query.cursor = args.cursor.clone();

        match self.client.list(&query).await {
            Ok(page) => {
                info!(
                    "Loaded {} memories ({} unreadable)",
                    page.records.len(),
                    page.unreadable_count()
                );
                format_page(&page, args.handle.as_deref())
            }
            Err(e) => {
                error!("Error retrieving memories: {}", e);
                format!("Error retrieving memories: {e}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SaveArgs {
    content: String,
    handle: String,
    description: String,
    idempotent_key: Option<String>,
}

impl SaveArgs {
    fn parse(args: &Value) -> Result<Self, ToolError> {
        let content = args["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: SAVE_MEMORY,
                reason: "missing required string 'content'".to_string(),
            })?;

        Ok(Self {
            content: content.to_string(),
            handle: optional_str(args, "handle").unwrap_or_else(|| DEFAULT_HANDLE.to_string()),
            description: optional_str(args, "description").unwrap_or_default(),
            idempotent_key: optional_str(args, "idempotent_key"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct LoadArgs {
    handle: Option<String>,
    limit: u32,
    cursor: Option<String>,
    mode: String,
}

impl LoadArgs {
    fn parse(args: &Value) -> Result<Self, ToolError> {
        let limit = match &args["limit"] {
            Value::Null => DEFAULT_PAGE_SIZE,
            value => value
                .as_u64()
                .map(|n| n.min(u64::from(u32::MAX)) as u32)
                .ok_or_else(|| ToolError::InvalidArguments {
                    tool: LOAD_MEMORIES,
                    reason: format!("'limit' must be a non-negative integer, got {value}"),
                })?,
        };

        Ok(Self {
            handle: optional_str(args, "handle").filter(|h| !h.trim().is_empty()),
            limit,
            cursor: optional_str(args, "cursor").filter(|c| !c.trim().is_empty()),
            mode: optional_str(args, "mode").unwrap_or_else(|| RetrievalMode::Full.to_string()),
        })
    }
}

fn optional_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn saved_message(memory_id: &str, idempotent_key: Option<&str>) -> String {
    let mut out = format!("Successfully archived in memory. ID: {memory_id}");
    if let Some(key) = idempotent_key.filter(|k| !k.is_empty()) {
        out.push_str(&format!("\nIdempotent key: {key}"));
    }
    out
}

fn save_diagnostic(request: &memo_client::RequestError, args: &SaveArgs) -> String {
    json!({
        "url": request.url,
        "status_code": request.status,
        "response_text": request.response_text,
        "payload": request.payload,
        "handle": args.handle,
        "description": args.description,
        "content_length": args.content.chars().count(),
    })
    .to_string()
}

/// Render a page the way the agent reads it.
pub fn format_page(page: &MemoryPage, handle: Option<&str>) -> String {
    if page.records.is_empty() {
        let mut out = format!(
            "No memories found under the handle: {}.",
            handle.unwrap_or("all")
        );
        if page.is_past_end() {
            out.push_str(" The cursor may be past the last page; omit it to start from the beginning.");
        }
        return out;
    }

    let mut out = vec!["### Retrieved Memories:".to_string()];
    out.extend(page.records.iter().map(format_memory));
    if let Some(cursor) = &page.next_cursor {
        out.push(format!("Next cursor: {cursor}"));
    }
    out.join("\n")
}

fn format_memory(memory: &MemoryView) -> String {
    let mut lines = vec![format!("Handle: [{}]", memory.handle)];
    if let Some(description) = memory.description.as_deref().filter(|d| !d.is_empty()) {
        lines.push(format!("Description: {description}"));
    }
    match &memory.content {
        Some(MemoryContent::Text(text)) => lines.push(format!("Content: {text}")),
        Some(MemoryContent::Unreadable { reason }) => {
            lines.push(format!("Content: <unreadable: {reason}>"))
        }
        None => {}
    }
    if memory.description.is_none() && memory.content.is_none() {
        lines.push(format!("ID: {}", memory.id));
        if !memory.metadata.is_empty() {
            lines.push(format!("Metadata: {}", Value::Object(memory.metadata.clone())));
        }
    }
    if let Some(key) = memory.idempotent_key.as_deref().filter(|k| !k.is_empty()) {
        lines.push(format!("Idempotent key: {key}"));
    }
    lines.push("---".to_string());
    lines.join("\n")
}
