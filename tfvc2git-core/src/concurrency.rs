//! The concurrency primitives the commit planner replays changesets with
//! (§4.G): a bounded-parallel map over I/O-bound work that preserves input
//! order, a one-slot lookahead over an async stream of fallible items, and a
//! cooperative cancellation flag threaded through both.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{self, Stream, StreamExt};

use crate::error::{LookaheadError, MigrationResult};
use crate::history::{Change, ChangesetMeta, HistorySource};

/// A cheaply-cloned cancellation flag. Long-running loops check
/// [`CancellationToken::is_cancelled`] between changesets and unwind with
/// [`crate::error::MigrationError::precondition`] rather than mid-changeset,
/// so a cancelled run never leaves a half-applied changeset behind.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
  pub fn new() -> Self {
    Self(Arc::new(AtomicBool::new(false)))
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// Apply `f` to every item in `items`, running up to `concurrency` calls
/// concurrently, and return the results in input order. Intended for
/// I/O-bound work (content downloads, blob writes); the changeset-level
/// computation that drives this stays sequential.
pub async fn bounded_parallel_map<T, R, F, Fut>(items: Vec<T>, concurrency: usize, f: F) -> Vec<R>
where
  F: Fn(T) -> Fut,
  Fut: Future<Output = R>,
{
  stream::iter(items).map(f).buffered(concurrency.max(1)).collect().await
}

/// Build a stream of `(ChangesetMeta, Vec<Change>)` that fetches each
/// changeset's changes as it is polled, so wrapping it in a [`Lookahead`]
/// lets the next changeset's download overlap with the current changeset's
/// commit work (§5).
pub fn changeset_change_stream(
  history: Arc<dyn HistorySource>,
  changesets: Vec<ChangesetMeta>,
) -> impl Stream<Item = MigrationResult<(ChangesetMeta, Vec<Change>)>> + Send + 'static {
  stream::iter(changesets).then(move |meta| {
    let history = Arc::clone(&history);
    async move {
      let changes = history.list_changeset_changes(meta.changeset_id).await?;
      Ok((meta, changes))
    }
  })
}

/// `Lookahead`'s internal progress through one call to [`Lookahead::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookaheadState {
  /// No call to `next` has completed yet.
  Pending,
  /// A call to `next` is in flight; a second call while in this state is an
  /// overlap.
  InCall,
  /// The most recent call produced an item, available via `current`.
  ReadySome,
  /// The underlying stream is exhausted. Sticky: every later call to `next`
  /// returns `Ok(false)` without touching the stream again.
  ReadyEnd,
  /// The underlying stream yielded an error. Sticky, like `ReadyEnd`: the
  /// error is returned once, and every later call returns `Ok(false)`.
  Faulted,
}

/// An async stream wrapper that pre-fetches one item at a time behind
/// [`Lookahead::next`], so a caller can overlap the next fetch with its own
/// work on the current item (§4.G, testable property #8).
pub struct Lookahead<T> {
  source: Pin<Box<dyn Stream<Item = MigrationResult<T>> + Send>>,
  current: Option<T>,
  state: LookaheadState,
}

impl<T> Lookahead<T> {
  pub fn new(source: impl Stream<Item = MigrationResult<T>> + Send + 'static) -> Self {
    Self {
      source: Box::pin(source),
      current: None,
      state: LookaheadState::Pending,
    }
  }

  /// The most recently fetched item, or `None` before the first call to
  /// `next` and after the stream has ended or faulted.
  pub fn current(&self) -> Option<&T> {
    self.current.as_ref()
  }

  /// Fetch the next item. Returns `Ok(true)` when an item is now available
  /// via [`Lookahead::current`], `Ok(false)` at end of stream. Once the
  /// stream has ended or faulted, every later call returns `Ok(false)`
  /// without polling the stream again. Calling `next` again before a prior
  /// call has completed -- which can only happen if that prior call's
  /// future was abandoned mid-poll -- fails with `LookaheadError::OverlappedCall`.
  pub async fn next(&mut self) -> MigrationResult<bool> {
    match self.state {
      LookaheadState::InCall => return Err(LookaheadError::OverlappedCall.into()),
      LookaheadState::ReadyEnd | LookaheadState::Faulted => return Ok(false),
      LookaheadState::Pending | LookaheadState::ReadySome => {}
    }

    self.state = LookaheadState::InCall;
    match self.source.next().await {
      Some(Ok(item)) => {
        self.current = Some(item);
        self.state = LookaheadState::ReadySome;
        Ok(true)
      }
      Some(Err(err)) => {
        self.current = None;
        self.state = LookaheadState::Faulted;
        Err(err)
      }
      None => {
        self.current = None;
        self.state = LookaheadState::ReadyEnd;
        Ok(false)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::future::Future;
  use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

  use super::*;
  use crate::error::MigrationError;

  #[tokio::test]
  async fn bounded_parallel_map_preserves_order() {
    let items = vec![3u32, 1, 2];
    let results = bounded_parallel_map(items, 2, |n| async move {
      tokio::time::sleep(std::time::Duration::from_millis(n as u64)).await;
      n * 10
    })
    .await;
    assert_eq!(results, vec![30, 10, 20]);
  }

  #[tokio::test]
  async fn lookahead_advances_through_a_stream_of_results() {
    let items: Vec<MigrationResult<u32>> = vec![Ok(1), Ok(2)];
    let mut lookahead = Lookahead::new(stream::iter(items));

    assert_eq!(lookahead.current(), None);
    assert!(lookahead.next().await.unwrap());
    assert_eq!(lookahead.current(), Some(&1));
    assert!(lookahead.next().await.unwrap());
    assert_eq!(lookahead.current(), Some(&2));
    assert!(!lookahead.next().await.unwrap());
    assert_eq!(lookahead.current(), None, "end of stream clears the pre-fetched item");
    assert!(!lookahead.next().await.unwrap(), "end of stream must be sticky");
  }

  #[tokio::test]
  async fn next_is_sticky_after_a_fault() {
    let items: Vec<MigrationResult<u32>> = vec![Ok(1), Err(MigrationError::transient_io("boom")), Ok(3)];
    let mut lookahead = Lookahead::new(stream::iter(items));

    assert!(lookahead.next().await.unwrap());
    assert_eq!(lookahead.current(), Some(&1));
    assert!(lookahead.next().await.is_err());
    assert_eq!(lookahead.current(), None);
    // The item queued behind the fault is never surfaced, and a faulted
    // lookahead reports plain end-of-sequence rather than repeating the
    // error or raising a spurious overlap error.
    assert!(!lookahead.next().await.unwrap());
    assert!(!lookahead.next().await.unwrap());
  }

  fn noop_waker() -> Waker {
    fn clone(_: *const ()) -> RawWaker {
      raw_waker()
    }
    fn no_op(_: *const ()) {}
    fn raw_waker() -> RawWaker {
      static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
      RawWaker::new(std::ptr::null(), &VTABLE)
    }
    unsafe { Waker::from_raw(raw_waker()) }
  }

  /// Yields `Pending` once (waking immediately) and `Ready(Some(42))` on the
  /// following poll, so a test can abandon the first `next()` future mid-poll
  /// and observe the leftover `InCall` state on the second call.
  struct PendingOnceThenReady {
    polled: bool,
  }

  impl Stream for PendingOnceThenReady {
    type Item = MigrationResult<u32>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
      if self.polled {
        Poll::Ready(Some(Ok(42)))
      } else {
        self.polled = true;
        cx.waker().wake_by_ref();
        Poll::Pending
      }
    }
  }

  #[test]
  fn next_reports_overlapped_call_after_a_prior_call_is_abandoned_mid_poll() {
    let mut lookahead = Lookahead::new(PendingOnceThenReady { polled: false });
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);

    {
      let mut first = Box::pin(lookahead.next());
      assert!(first.as_mut().poll(&mut cx).is_pending());
      // `first` is dropped here without ever completing, leaving Lookahead
      // in the `InCall` state.
    }

    let mut second = Box::pin(lookahead.next());
    match second.as_mut().poll(&mut cx) {
      Poll::Ready(Err(MigrationError::Invariant { message, .. })) => {
        assert!(message.contains("overlapping call"), "unexpected message: {message}");
      }
      other => panic!("expected an immediate overlap error, got {other:?}"),
    }
  }

  #[test]
  fn cancellation_token_is_observed_after_cancel() {
    let token = CancellationToken::new();
    assert!(!token.is_cancelled());
    token.cancel();
    assert!(token.is_cancelled());
    assert!(token.clone().is_cancelled());
  }
}
