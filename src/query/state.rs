use crate::api::ApiError;
use serde_json::Value;
use tokio::time::Instant;

/// Lifecycle of a cache entry.
///
/// ```text
/// Idle -> Loading -> Success
///            |   \-> Error
///            ^          |
///            \----------/  retry, refetch, poll
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchState {
  /// Nothing has been requested yet
  #[default]
  Idle,
  /// A request (or a retry of one) is outstanding
  Loading,
  /// The last fetch cycle succeeded
  Success,
  /// The last fetch cycle failed after exhausting retries
  Error,
}

impl FetchState {
  /// Whether the state machine allows moving from `self` to `next`.
  pub fn can_transition_to(self, next: FetchState) -> bool {
    use FetchState::*;
    matches!(
      (self, next),
      (Idle, Loading)
        | (Loading, Loading)
        | (Loading, Success)
        | (Loading, Error)
        | (Success, Loading)
        | (Error, Loading)
        // Discarded responses settle back to whatever the data says
        | (Loading, Idle)
    )
  }
}

/// Snapshot of one subscription's view of its cache entry.
#[derive(Debug, Clone, Copy)]
pub struct QueryResult<'a> {
  /// Last successful payload, kept while refreshing
  pub data: Option<&'a Value>,
  /// Terminal error of the last fetch cycle
  pub error: Option<&'a ApiError>,
  /// Whether a network request is outstanding for this subscription
  pub is_loading: bool,
  pub state: FetchState,
  /// When `data` was fetched
  pub fetched_at: Option<Instant>,
  /// Identifies the response `data` came from; changes whenever data does
  pub revision: u64,
}

impl<'a> QueryResult<'a> {
  pub(crate) fn empty() -> Self {
    Self {
      data: None,
      error: None,
      is_loading: false,
      state: FetchState::Idle,
      fetched_at: None,
      revision: 0,
    }
  }

  pub fn is_success(&self) -> bool {
    self.state == FetchState::Success
  }

  pub fn is_error(&self) -> bool {
    self.state == FetchState::Error
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transitions() {
    use FetchState::*;
    assert!(Idle.can_transition_to(Loading));
    assert!(Loading.can_transition_to(Success));
    assert!(Loading.can_transition_to(Error));
    assert!(Error.can_transition_to(Loading));
    assert!(Success.can_transition_to(Loading));

    assert!(!Idle.can_transition_to(Success));
    assert!(!Success.can_transition_to(Error));
    assert!(!Error.can_transition_to(Success));
  }
}
