//! Memo Client - end-to-end encrypted memory storage
//!
//! Memories are sealed with [`memo_crypto::EnvelopeCodec`] before they
//! leave the process. The service stores and returns only envelopes.
//!
//! # Example
//!
//! ```no_run
//! use memo_client::{ListQuery, MemoClient, MemoConfig, RetrievalMode, StoreRequest};
//! use memo_crypto::MemoKeyPair;
//!
//! # async fn example(pem: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let keys = MemoKeyPair::from_pem(pem)?;
//! let client = MemoClient::new(MemoConfig::new("api-key", "https://api.yomemo.ai"), keys)?;
//!
//! let outcome = client
//!     .store(StoreRequest::new("Prefers tabs").handle("Editor Settings"))
//!     .await?;
//! println!("stored: {:?}", outcome.memory_id());
//!
//! let page = client
//!     .list(&ListQuery::new().handle("editor-settings").mode(RetrievalMode::Full))
//!     .await?;
//! for memory in page.records {
//!     println!("{}: {:?}", memory.id, memory.content);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::{default_metadata, normalize_handle, MemoClient, DEFAULT_HANDLE};
pub use config::{MemoConfig, API_KEY_HEADER, DEFAULT_BASE_URL, DEFAULT_SOURCE_TAG};
pub use error::{MemoError, RequestError};
pub use types::{
    ListQuery, MemoryContent, MemoryPage, MemoryView, Metadata, RetrievalMode, StoreOutcome,
    StoreRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
