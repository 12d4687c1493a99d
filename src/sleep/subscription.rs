//! Host boundary for sleep segment subscriptions.
//!
//! The detector reports whether a subscription request succeeded some time
//! after the request is made. That outcome is delivered here as an explicit
//! `Result` over a one-shot channel, resolved exactly once.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Answers whether the OS capability needed for sleep detection is granted.
pub trait PermissionProbe: Send + Sync {
    fn activity_recognition_granted(&self) -> bool;
}

/// Probe for hosts without a permission gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

impl PermissionProbe for AlwaysGranted {
    fn activity_recognition_granted(&self) -> bool {
        true
    }
}

/// The detector's sleep segment feed.
pub trait SleepSegmentSource: Send + Sync {
    /// Ask the detector to start delivering segments.
    ///
    /// Returns immediately; the returned [`Subscription`] resolves once the
    /// detector accepts or rejects the request.
    fn request_segment_updates(&self) -> Subscription;
}

/// Failure reported by the host detector, as raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFailure {
    pub message: String,
    pub cause: Option<String>,
}

impl SubscriptionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

/// Why a subscription request failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Sleep API not available: {0}")]
    ApiNotAvailable(String),

    #[error("Detector setup requires user resolution: {0}")]
    ResolutionRequired(String),

    #[error("Network error while subscribing: {0}")]
    Network(String),

    #[error("Subscription failed: {0}")]
    Other(String),

    /// The host dropped the request without reporting an outcome
    #[error("Subscription abandoned before it resolved")]
    Abandoned,
}

impl SubscriptionError {
    /// Classify a host failure by the status name in its message.
    pub fn classify(failure: &SubscriptionFailure) -> Self {
        let status = failure.message.as_str();
        let message = match &failure.cause {
            Some(cause) => format!("{status} (cause: {cause})"),
            None => status.to_string(),
        };

        if status.contains("API_NOT_AVAILABLE") {
            SubscriptionError::ApiNotAvailable(message)
        } else if status.contains("RESOLUTION_REQUIRED") {
            SubscriptionError::ResolutionRequired(message)
        } else if status.contains("NETWORK_ERROR") {
            SubscriptionError::Network(message)
        } else {
            SubscriptionError::Other(message)
        }
    }

    /// What the user can do about it.
    pub fn remediation(&self) -> &'static str {
        match self {
            SubscriptionError::ApiNotAvailable(_) => {
                "Update the platform services that provide sleep detection"
            }
            SubscriptionError::ResolutionRequired(_) => {
                "Complete the platform services setup prompt, then retry"
            }
            SubscriptionError::Network(_) => "Check the network connection, then retry",
            SubscriptionError::Other(_) | SubscriptionError::Abandoned => {
                "Unrecognized failure; retry later"
            }
        }
    }
}

/// Sending half of a subscription outcome; consumed on use.
#[derive(Debug)]
pub struct SubscriptionResolver {
    sender: Sender<Result<(), SubscriptionError>>,
}

impl SubscriptionResolver {
    pub fn succeed(self) {
        let _ = self.sender.send(Ok(()));
    }

    pub fn fail(self, failure: SubscriptionFailure) {
        let _ = self.sender.send(Err(SubscriptionError::classify(&failure)));
    }
}

/// Pending outcome of one subscription request.
#[derive(Debug)]
pub struct Subscription {
    receiver: Receiver<Result<(), SubscriptionError>>,
}

impl Subscription {
    /// Create a linked resolver/subscription pair.
    pub fn channel() -> (SubscriptionResolver, Subscription) {
        let (sender, receiver) = bounded(1);
        (SubscriptionResolver { sender }, Subscription { receiver })
    }

    /// A subscription that has already resolved.
    pub fn resolved(outcome: Result<(), SubscriptionError>) -> Self {
        let (sender, receiver) = bounded(1);
        let _ = sender.send(outcome);
        Subscription { receiver }
    }

    /// The outcome if the host has reported it.
    pub fn try_outcome(&self) -> Option<Result<(), SubscriptionError>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(SubscriptionError::Abandoned)),
        }
    }

    /// Wait up to `timeout` for the outcome.
    pub fn wait_timeout(self, timeout: Duration) -> Option<Result<(), SubscriptionError>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(SubscriptionError::Abandoned)),
        }
    }

    /// Wait for the outcome and log it, with a remediation hint on failure.
    pub fn log_outcome(self, timeout: Duration) -> Option<Result<(), SubscriptionError>> {
        let outcome = self.wait_timeout(timeout);
        match &outcome {
            Some(Ok(())) => info!("Subscribed to sleep segment updates"),
            Some(Err(e)) => error!(error = %e, hint = e.remediation(), "Failed to subscribe to sleep updates"),
            None => info!(?timeout, "Sleep subscription still pending"),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_host_messages() {
        let classify = |m: &str| SubscriptionError::classify(&SubscriptionFailure::new(m));

        assert!(matches!(
            classify("17: API_NOT_AVAILABLE"),
            SubscriptionError::ApiNotAvailable(_)
        ));
        assert!(matches!(
            classify("6: RESOLUTION_REQUIRED"),
            SubscriptionError::ResolutionRequired(_)
        ));
        assert!(matches!(
            classify("7: NETWORK_ERROR"),
            SubscriptionError::Network(_)
        ));
        assert!(matches!(classify("boom"), SubscriptionError::Other(_)));

        let with_cause = SubscriptionError::classify(
            &SubscriptionFailure::new("7: NETWORK_ERROR").with_cause("timeout"),
        );
        assert_eq!(
            with_cause,
            SubscriptionError::Network("7: NETWORK_ERROR (cause: timeout)".to_string())
        );
    }

    #[test]
    fn test_resolves_exactly_once() {
        let (resolver, subscription) = Subscription::channel();
        assert_eq!(subscription.try_outcome(), None);

        resolver.succeed();
        assert_eq!(subscription.try_outcome(), Some(Ok(())));
        // The resolver was consumed, so a second success can never arrive.
        assert_ne!(subscription.try_outcome(), Some(Ok(())));
    }

    #[test]
    fn test_dropped_resolver_abandons() {
        let (resolver, subscription) = Subscription::channel();
        drop(resolver);
        assert_eq!(
            subscription.wait_timeout(Duration::from_millis(10)),
            Some(Err(SubscriptionError::Abandoned))
        );
    }

    #[test]
    fn test_failure_from_another_thread() {
        let (resolver, subscription) = Subscription::channel();
        let handle = std::thread::spawn(move || {
            resolver.fail(SubscriptionFailure::new("API_NOT_AVAILABLE"));
        });

        let outcome = subscription.log_outcome(Duration::from_secs(5));
        handle.join().unwrap();
        assert!(matches!(
            outcome,
            Some(Err(SubscriptionError::ApiNotAvailable(_)))
        ));
    }
}
