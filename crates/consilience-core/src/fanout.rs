//! Bounded "launch N, join all, tolerate partial failure" primitive.
//!
//! Specialist fan-out and dedup comparisons both go through [`Fanout`]: at
//! most `limit` calls are in flight, each call carries its own deadline, and a
//! failed or timed-out call becomes a [`CallOutcome`] instead of failing the
//! batch.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::error::ConsilienceError;

/// Result of one call inside a fan-out.
#[derive(Debug)]
pub enum CallOutcome<T> {
    Done(T),
    Failed(ConsilienceError),
    TimedOut,
}

impl<T> CallOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            CallOutcome::Done(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, CallOutcome::Done(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Fanout {
    limit: usize,
    per_call: Duration,
}

impl Fanout {
    pub fn new(limit: usize, per_call: Duration) -> Self {
        Self {
            limit: limit.max(1),
            per_call,
        }
    }

    /// Run `f` over every item and return the outcomes in input order.
    pub async fn join_all<I, T, F, Fut>(&self, items: Vec<I>, f: F) -> Vec<CallOutcome<T>>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T, ConsilienceError>>,
    {
        let mut indexed: Vec<(usize, CallOutcome<T>)> =
            self.launch(items, f).collect::<Vec<_>>().await;
        indexed.sort_by_key(|(i, _)| *i);
        indexed.into_iter().map(|(_, outcome)| outcome).collect()
    }

    /// Run `f` over the items until `matches` accepts an outcome.
    ///
    /// Returns the input index of the first accepted outcome in completion
    /// order. Dropping the stream cancels calls still in flight.
    pub async fn first_match<I, T, F, Fut, P>(&self, items: Vec<I>, f: F, matches: P) -> Option<usize>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T, ConsilienceError>>,
        P: Fn(&CallOutcome<T>) -> bool,
    {
        let mut running = Box::pin(self.launch(items, f));
        while let Some((index, outcome)) = running.next().await {
            if matches(&outcome) {
                return Some(index);
            }
        }
        None
    }

    fn launch<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        f: F,
    ) -> impl futures::Stream<Item = (usize, CallOutcome<T>)>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T, ConsilienceError>>,
    {
        let per_call = self.per_call;
        stream::iter(items.into_iter().enumerate())
            .map(move |(index, item)| {
                let call = f(item);
                async move {
                    let outcome = match tokio::time::timeout(per_call, call).await {
                        Ok(Ok(value)) => CallOutcome::Done(value),
                        Ok(Err(e)) => CallOutcome::Failed(e),
                        Err(_) => CallOutcome::TimedOut,
                    };
                    (index, outcome)
                }
            })
            .buffer_unordered(self.limit)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
