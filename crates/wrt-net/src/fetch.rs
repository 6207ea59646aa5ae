#![forbid(unsafe_code)]

//! The retry loop.

use web_time::Duration;

use crate::abort::AbortSignal;
use crate::retry::RetryPolicy;
use crate::transport::{NetError, Request, Response, Transport};

/// Send `request`, retrying per `policy` while `signal` stays quiet.
///
/// - Non-idempotent requests get exactly one attempt.
/// - Only statuses in the policy's retriable set are retried; transport
///   errors are returned at once.
/// - `sleep` is called between attempts with the backoff delay.
/// - Once `signal` fires no further attempt is made.
///
/// On exhaustion the last failure is returned.
pub fn fetch_with_retry<T, S>(
    transport: &T,
    request: &Request,
    policy: &RetryPolicy,
    signal: &AbortSignal,
    mut sleep: S,
) -> Result<Response, NetError>
where
    T: Transport + ?Sized,
    S: FnMut(Duration),
{
    let retries = if request.method.is_idempotent() {
        policy.max_retries
    } else {
        0
    };
    let mut attempt = 0u32;
    loop {
        if let Some(reason) = signal.reason() {
            return Err(NetError::Aborted(reason));
        }
        let mut outgoing = request.clone();
        outgoing.timeout = match (request.timeout, signal.remaining()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let response = transport.send(&outgoing)?;
        if response.is_success() {
            return Ok(response);
        }
        let status = response.status;
        if !policy.is_retriable(status) || attempt >= retries {
            return Err(NetError::Status {
                status,
                attempts: attempt + 1,
            });
        }
        if let Some(reason) = signal.reason() {
            return Err(NetError::Aborted(reason));
        }
        let delay = policy.delay(attempt);
        tracing::warn!(
            method = %request.method,
            url = %request.url,
            status,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "retriable status; backing off"
        );
        sleep(delay);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::{AbortController, AbortReason};
    use crate::retry::BackoffStrategy;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use url::Url;

    struct Scripted {
        replies: RefCell<VecDeque<Result<Response, NetError>>>,
        seen: RefCell<Vec<Request>>,
    }

    impl Scripted {
        fn new(replies: impl IntoIterator<Item = Result<Response, NetError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into_iter().collect()),
                seen: RefCell::default(),
            }
        }
    }

    impl Transport for Scripted {
        fn send(&self, request: &Request) -> Result<Response, NetError> {
            self.seen.borrow_mut().push(request.clone());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(Response::new(500, "script exhausted")))
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(
            3,
            BackoffStrategy::Exponential {
                base_ms: 10,
                max_ms: 1000,
            },
        )
    }

    fn get() -> Request {
        Request::get(Url::parse("https://plans.example/plans/abc").unwrap())
    }

    #[test]
    fn retries_then_succeeds_with_exponential_delays() {
        let transport = Scripted::new([
            Ok(Response::new(503, "")),
            Ok(Response::new(429, "")),
            Ok(Response::new(200, "ok")),
        ]);
        let mut delays = Vec::new();
        let response =
            fetch_with_retry(&transport, &get(), &policy(), &AbortSignal::never(), |d| {
                delays.push(d);
            })
            .unwrap();
        assert_eq!(response.body, "ok");
        assert_eq!(
            delays,
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }

    #[test]
    fn exhaustion_returns_last_status() {
        let transport = Scripted::new([]);
        let err = fetch_with_retry(&transport, &get(), &policy(), &AbortSignal::never(), |_| {})
            .unwrap_err();
        assert_eq!(
            err,
            NetError::Status {
                status: 500,
                attempts: 4
            }
        );
        assert_eq!(transport.seen.borrow().len(), 4);
    }

    #[test]
    fn non_retriable_status_fails_fast() {
        let transport = Scripted::new([Ok(Response::new(404, ""))]);
        let err = fetch_with_retry(&transport, &get(), &policy(), &AbortSignal::never(), |_| {})
            .unwrap_err();
        assert_eq!(
            err,
            NetError::Status {
                status: 404,
                attempts: 1
            }
        );
    }

    #[test]
    fn post_is_never_retried() {
        let transport = Scripted::new([Ok(Response::new(503, ""))]);
        let request = Request::post_json(Url::parse("https://plans.example/plans").unwrap(), "{}");
        let err = fetch_with_retry(&transport, &request, &policy(), &AbortSignal::never(), |_| {})
            .unwrap_err();
        assert!(matches!(err, NetError::Status { attempts: 1, .. }));
    }

    #[test]
    fn transport_error_is_not_retried() {
        let transport = Scripted::new([Err(NetError::Transport("reset".into()))]);
        let err = fetch_with_retry(&transport, &get(), &policy(), &AbortSignal::never(), |_| {})
            .unwrap_err();
        assert_eq!(err, NetError::Transport("reset".into()));
        assert_eq!(transport.seen.borrow().len(), 1);
    }

    #[test]
    fn aborted_signal_sends_nothing() {
        let controller = AbortController::new();
        controller.abort();
        let transport = Scripted::new([]);
        let err = fetch_with_retry(&transport, &get(), &policy(), &controller.signal(), |_| {})
            .unwrap_err();
        assert_eq!(err, NetError::Aborted(AbortReason::Caller));
        assert!(transport.seen.borrow().is_empty());
    }

    #[test]
    fn abort_during_backoff_stops_retries() {
        let controller = AbortController::new();
        let transport = Scripted::new([Ok(Response::new(503, "")), Ok(Response::new(200, ""))]);
        let err = fetch_with_retry(&transport, &get(), &policy(), &controller.signal(), |_| {
            controller.abort();
        })
        .unwrap_err();
        assert_eq!(err, NetError::Aborted(AbortReason::Caller));
        assert_eq!(transport.seen.borrow().len(), 1);
    }

    #[test]
    fn deadline_is_forwarded_as_timeout() {
        let transport = Scripted::new([Ok(Response::new(200, ""))]);
        let signal = AbortSignal::timeout(Duration::from_secs(30));
        fetch_with_retry(&transport, &get(), &policy(), &signal, |_| {}).unwrap();
        let timeout = transport.seen.borrow()[0].timeout;
        assert!(timeout.is_some_and(|t| t <= Duration::from_secs(30)));
    }
}
