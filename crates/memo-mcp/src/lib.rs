//! Memo MCP - the encrypted memory store as agent tools
//!
//! Wires [`memo_client::MemoClient`] to two MCP tools, `save_memory` and
//! `load_memories`, served over stdio.

pub mod config;
pub mod server;
pub mod tools;

pub use config::{ConfigError, ServerConfig};
pub use server::McpServer;
pub use tools::{format_page, tool_schemas, MemoryTools, ToolError};
