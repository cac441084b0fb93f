//! Storage Layer seams.
//!
//! [`ConversationStore`] serves the context side (snapshots, delivered
//! history); [`LaneStore`] persists the four priority lanes. `LaneStore` is
//! synchronous: an append has no suspension point, so cancelling the caller
//! cannot leave a half-written entry behind.

pub mod lane_db;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ConversationMessage, ContextSnapshot, DeliveredResponse, Priority, QueuedResponse, SessionId};

pub use lane_db::LaneDb;
pub use memory::MemoryStore;

/// Raw messages kept in a snapshot.
pub const RECENT_MESSAGE_LIMIT: usize = 15;
/// Delivered responses kept in a snapshot.
pub const HISTORY_LIMIT: usize = 5;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_context_snapshot(&self, session: &SessionId) -> Result<ContextSnapshot>;

    async fn append_message(&self, session: &SessionId, message: ConversationMessage) -> Result<()>;

    async fn record_delivered(&self, session: &SessionId, response: DeliveredResponse) -> Result<()>;

    async fn set_domains(
        &self,
        session: &SessionId,
        active: Vec<String>,
        missing: Vec<String>,
    ) -> Result<()>;

    async fn set_summary(&self, session: &SessionId, summary: String) -> Result<()>;
}

pub trait LaneStore: Send + Sync {
    /// Append one response to the tail of its lane, atomically.
    fn append(&self, session: &SessionId, response: &QueuedResponse) -> Result<()>;

    /// The lane's contents, oldest first.
    fn read_lane(&self, session: &SessionId, priority: Priority) -> Result<Vec<QueuedResponse>>;

    /// Remove and return the lane's contents, oldest first.
    fn take_lane(&self, session: &SessionId, priority: Priority) -> Result<Vec<QueuedResponse>>;
}
