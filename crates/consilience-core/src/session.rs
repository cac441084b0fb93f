//! Session-scoped state shared by one session's trigger controller and
//! background monitor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::dedup::DedupLedger;
use crate::error::{ConsilienceError, Result};
use crate::queue::PriorityQueueStore;
use crate::storage::ConversationStore;
use crate::types::{ContextSnapshot, SessionId};

pub struct SessionState {
    id: SessionId,
    started_at: Instant,
    /// Messages recorded in this session so far, whatever their numbering.
    arrivals: watch::Sender<u64>,
    cancel: CancellationToken,
    ledger: DedupLedger,
    queue: Arc<PriorityQueueStore>,
    conversation: Arc<dyn ConversationStore>,
    context_timeout: Duration,
}

impl SessionState {
    pub fn new(
        id: SessionId,
        ledger: DedupLedger,
        queue: Arc<PriorityQueueStore>,
        conversation: Arc<dyn ConversationStore>,
        context_timeout: Duration,
    ) -> Self {
        let (arrivals, _) = watch::channel(0);
        Self {
            id,
            started_at: Instant::now(),
            arrivals,
            cancel: CancellationToken::new(),
            ledger,
            queue,
            conversation,
            context_timeout,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    pub fn queue(&self) -> &PriorityQueueStore {
        &self.queue
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Count one recorded message.
    pub fn note_arrival(&self) {
        self.arrivals.send_modify(|count| *count += 1);
    }

    pub fn arrivals(&self) -> u64 {
        *self.arrivals.borrow()
    }

    pub fn subscribe_arrivals(&self) -> watch::Receiver<u64> {
        self.arrivals.subscribe()
    }

    /// Pull a fresh snapshot from the conversation store. Never cached.
    pub async fn fetch_context(&self) -> Result<ContextSnapshot> {
        match tokio::time::timeout(
            self.context_timeout,
            self.conversation.get_context_snapshot(&self.id),
        )
        .await
        {
            Ok(snapshot) => snapshot,
            Err(_) => Err(ConsilienceError::CollaboratorTimeout {
                capability: "get_context_snapshot",
                after: self.context_timeout,
            }),
        }
    }
}
