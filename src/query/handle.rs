use super::cache::Message;
use super::key::QueryKey;
use tokio::sync::mpsc;

/// Identifier of one subscription to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

/// A view's live interest in a cache key.
///
/// Dropping the handle unsubscribes. The cache processes the unsubscribe on
/// its next `tick`, before any response that arrived after the drop, so a
/// response nobody waits for anymore is never applied.
#[derive(Debug)]
pub struct QueryHandle {
  pub(crate) id: SubscriptionId,
  pub(crate) key: QueryKey,
  tx: mpsc::UnboundedSender<Message>,
}

impl QueryHandle {
  pub(crate) fn new(id: SubscriptionId, key: QueryKey, tx: mpsc::UnboundedSender<Message>) -> Self {
    Self { id, key, tx }
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }
}

impl Drop for QueryHandle {
  fn drop(&mut self) {
    // The cache may already be gone during shutdown
    let _ = self.tx.send(Message::Unsubscribe(self.id));
  }
}
