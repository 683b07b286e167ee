//! Memory store contract.
//!
//! A recall/write interface with no contract on internal indexing. The host
//! decides whether this is vector search, keyword search, or a flat log.

use crate::{MaestroResult, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One recalled memory item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub key: String,
    pub content: String,
    /// Recall weight, 0.0 to 1.0
    pub importance: f32,
    pub tags: Vec<String>,
    pub created_at: Timestamp,
}

/// Host-supplied memory store.
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Write a memory item.
    async fn store(
        &self,
        key: &str,
        content: &str,
        importance: f32,
        tags: &[String],
    ) -> MaestroResult<()>;

    /// Recall up to `limit` items relevant to `query`, most relevant first.
    async fn get_context(&self, query: &str, limit: usize) -> MaestroResult<Vec<MemoryEntry>>;
}
