use std::{future::Future, sync::Arc};
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinSet};

/// How a [`TaskGroup`] reacts when one of its units fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop waiting at the first failure and return it. Units that are still
    /// in flight are aborted.
    #[default]
    FailFast,
    /// Wait for every unit and hand back each outcome.
    CollectAll,
}

/// Errors produced while joining a [`TaskGroup`].
#[derive(Error, Debug)]
pub enum TaskError<E> {
    /// The unit ran to completion and produced an error.
    #[error("{0}")]
    Failed(E),

    /// The unit panicked or was cancelled before producing an outcome.
    #[error("Unable to rejoin pending task: {0}")]
    Join(String),
}

/// An aggregator for a batch of independent units of async work.
///
/// Each spawned unit produces a typed result or error. Joining the group
/// collects exactly one outcome per unit, in completion order (not spawn
/// order), so callers correlate outcomes with their inputs through the values
/// themselves. The group may be bounded, in which case at most `limit` units
/// make progress at the same time.
///
/// ```rust
/// # use kms_common::{FailurePolicy, TaskGroup};
/// # #[tokio::main(flavor = "multi_thread")]
/// # async fn main() {
/// let mut group = TaskGroup::<usize, std::io::Error>::bounded(2);
/// for i in 0..5 {
///     group.spawn(async move { Ok(i * 2) });
/// }
/// let outcomes = group.join(FailurePolicy::CollectAll).await.unwrap();
/// assert_eq!(outcomes.len(), 5);
/// # }
/// ```
pub struct TaskGroup<T, E> {
    tasks: JoinSet<Result<T, E>>,
    permits: Option<Arc<Semaphore>>,
}

impl<T, E> Default for TaskGroup<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> TaskGroup<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Creates a group that lets every spawned unit run at once.
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            permits: None,
        }
    }

    /// Creates a group in which at most `limit` units run concurrently. A
    /// limit of zero is treated as one.
    pub fn bounded(limit: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            permits: Some(Arc::new(Semaphore::new(limit.max(1)))),
        }
    }

    /// Schedule a unit of work on the current runtime.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let permits = self.permits.clone();
        self.tasks.spawn(async move {
            let _permit = match permits {
                Some(permits) => permits.acquire_owned().await.ok(),
                None => None,
            };
            future.await
        });
    }

    /// The number of units that have not been joined yet.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true when no unit is pending.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for the group according to `policy`.
    ///
    /// With [`FailurePolicy::FailFast`] the first failing unit is returned as
    /// `Err` and the remaining units are aborted; otherwise `Ok` carries one
    /// outcome per spawned unit.
    pub async fn join(
        mut self,
        policy: FailurePolicy,
    ) -> Result<Vec<Result<T, TaskError<E>>>, TaskError<E>> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());

        while let Some(joined) = self.tasks.join_next().await {
            let outcome = match joined {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(TaskError::Failed(error)),
                Err(error) => Err(TaskError::Join(error.to_string())),
            };

            match (policy, outcome) {
                (FailurePolicy::FailFast, Err(error)) => {
                    tracing::debug!(
                        pending = self.tasks.len(),
                        "Unit failed, aborting remaining units"
                    );
                    self.tasks.abort_all();
                    return Err(error);
                }
                (_, outcome) => outcomes.push(outcome),
            }
        }

        Ok(outcomes)
    }

    /// Wait for every unit, failing fast, and return the bare values.
    pub async fn try_join(self) -> Result<Vec<T>, TaskError<E>> {
        self.join(FailurePolicy::FailFast)
            .await?
            .into_iter()
            .collect()
    }
}

impl<T, E> std::fmt::Debug for TaskGroup<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("tasks", &self.tasks.len())
            .field("bounded", &self.permits.is_some())
            .finish()
    }
}
