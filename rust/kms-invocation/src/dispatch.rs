//! Sending batches of invocations concurrently.

use crate::{
    sign::SignedInvocation,
    transport::{InvocationResponse, Transport},
};
use kms_common::{FailurePolicy, TaskError, TaskGroup};
use std::sync::Arc;
use thiserror::Error;

/// A successful invocation, tagged with what it invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Identifier of the invoked capability.
    pub capability_id: String,
    /// The requested action.
    pub action: String,
    /// The service's answer.
    pub response: InvocationResponse,
}

/// Why one invocation of a batch failed.
#[derive(Debug, Error)]
pub enum DispatchError<E> {
    /// The transport could not deliver the invocation.
    #[error("Invocation of {capability_id} ({action}) failed: {source}")]
    Transport {
        /// Identifier of the invoked capability.
        capability_id: String,
        /// The requested action.
        action: String,
        /// The transport failure.
        #[source]
        source: E,
    },

    /// The service answered with a non-success status.
    #[error("Invocation of {capability_id} ({action}) was rejected with status {status}")]
    Rejected {
        /// Identifier of the invoked capability.
        capability_id: String,
        /// The requested action.
        action: String,
        /// The HTTP status returned.
        status: u16,
    },

    /// The unit panicked or was cancelled.
    #[error("Invocation did not complete: {0}")]
    Aborted(String),
}

/// Send `invocations` concurrently through `transport`.
///
/// Every invocation is an independent unit; at most `concurrency` are in
/// flight at once when a limit is given. Responses with a non-2xx status
/// count as failures. Under [`FailurePolicy::FailFast`] the first failure is
/// returned and the rest are aborted; under [`FailurePolicy::CollectAll`]
/// one outcome per invocation is returned, in completion order.
pub async fn dispatch<T>(
    transport: Arc<T>,
    invocations: impl IntoIterator<Item = SignedInvocation>,
    policy: FailurePolicy,
    concurrency: Option<usize>,
) -> Result<Vec<Result<DispatchOutcome, DispatchError<T::Error>>>, DispatchError<T::Error>>
where
    T: Transport + Send + Sync + 'static,
    T::Error: Send,
{
    let mut group = match concurrency {
        Some(limit) => TaskGroup::bounded(limit),
        None => TaskGroup::new(),
    };

    for invocation in invocations {
        let transport = transport.clone();
        group.spawn(async move { send(transport.as_ref(), invocation).await });
    }

    tracing::debug!(units = group.len(), ?policy, "Dispatching invocations");

    let outcomes = group.join(policy).await.map_err(unwrap_task_error)?;
    Ok(outcomes
        .into_iter()
        .map(|outcome| outcome.map_err(unwrap_task_error))
        .collect())
}

async fn send<T: Transport>(
    transport: &T,
    invocation: SignedInvocation,
) -> Result<DispatchOutcome, DispatchError<T::Error>> {
    let capability_id = invocation.capability_id.clone();
    let action = invocation.action.clone();

    let response = match transport.send(invocation).await {
        Ok(response) => response,
        Err(source) => {
            return Err(DispatchError::Transport {
                capability_id,
                action,
                source,
            });
        }
    };

    if !response.is_success() {
        return Err(DispatchError::Rejected {
            capability_id,
            action,
            status: response.status,
        });
    }

    Ok(DispatchOutcome {
        capability_id,
        action,
        response,
    })
}

fn unwrap_task_error<E>(error: TaskError<DispatchError<E>>) -> DispatchError<E> {
    match error {
        TaskError::Failed(error) => error,
        TaskError::Join(reason) => DispatchError::Aborted(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::InvocationRequest;
    use pretty_assertions::assert_eq;
    use std::{
        collections::HashSet,
        convert::Infallible,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use testresult::TestResult;
    use url::Url;

    /// Answers with the capability id as body, or 403 for `refuse`.
    #[derive(Default)]
    struct Echo {
        refuse: Option<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Transport for Echo {
        type Error = Infallible;

        async fn send(
            &self,
            invocation: SignedInvocation,
        ) -> Result<InvocationResponse, Self::Error> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let status = if self.refuse.as_deref() == Some(invocation.capability_id.as_str()) {
                403
            } else {
                200
            };
            Ok(InvocationResponse {
                status,
                body: invocation.capability_id.into_bytes(),
            })
        }
    }

    fn invocations(count: usize) -> TestResult<Vec<SignedInvocation>> {
        let url = Url::parse("https://kms.example.com/kms/keystores/ks-1/keys")?;
        Ok((0..count)
            .map(|index| SignedInvocation {
                request: InvocationRequest::post(url.clone()),
                capability_id: format!("urn:zcap:{index}"),
                action: "create-key".to_string(),
            })
            .collect())
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn it_correlates_each_outcome_with_its_invocation() -> TestResult {
        let outcomes = dispatch(
            Arc::new(Echo::default()),
            invocations(4)?,
            FailurePolicy::FailFast,
            None,
        )
        .await?;

        let mut seen = HashSet::new();
        for outcome in outcomes {
            let outcome = outcome?;
            assert_eq!(outcome.response.body, outcome.capability_id.as_bytes());
            assert_eq!(outcome.action, "create-key");
            seen.insert(outcome.capability_id);
        }
        assert_eq!(seen.len(), 4);
        Ok(())
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn it_reports_rejections_according_to_policy() -> TestResult {
        let echo = Arc::new(Echo {
            refuse: Some("urn:zcap:2".into()),
            ..Echo::default()
        });

        let failed = dispatch(echo.clone(), invocations(5)?, FailurePolicy::FailFast, None).await;
        assert!(matches!(
            failed,
            Err(DispatchError::Rejected { ref capability_id, status: 403, .. })
                if capability_id == "urn:zcap:2"
        ));

        let outcomes = dispatch(echo, invocations(5)?, FailurePolicy::CollectAll, None).await?;
        assert_eq!(outcomes.len(), 5);
        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_err()).count(), 1);
        Ok(())
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn it_bounds_concurrency() -> TestResult {
        let echo = Arc::new(Echo::default());
        let outcomes = dispatch(
            echo.clone(),
            invocations(6)?,
            FailurePolicy::CollectAll,
            Some(2),
        )
        .await?;

        assert_eq!(outcomes.len(), 6);
        assert!(echo.peak.load(Ordering::SeqCst) <= 2);
        Ok(())
    }
}
