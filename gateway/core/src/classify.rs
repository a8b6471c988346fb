//! Error Classifier
//!
//! Labels a failed backend call so the dispatcher knows whether rotating
//! the credential could help. Only quota exhaustion triggers rotation;
//! every other failure is surfaced after the attempt it happened on.
//!
//! Upstream quota errors are recognised by text, which is brittle against
//! wording changes upstream. The matcher is therefore a trait so callers
//! can swap it without touching the dispatcher.

use std::fmt;

use crate::backend::BackendError;

/// Numeric status for "too many requests"
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Lower-case substrings that mark a quota or rate-limit rejection
pub const QUOTA_SIGNATURES: &[&str] = &[
    "resource_exhausted",
    "resource exhausted",
    "quota",
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
];

/// Outcome class of one failed attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Credential or identity ran out of quota; rotation may help
    QuotaExhausted,
    /// Timeout or transport failure
    Transient,
    /// Anything else
    Fatal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuotaExhausted => write!(f, "quota_exhausted"),
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Decides the class of a backend failure
pub trait ErrorClassifier: Send + Sync {
    /// Classify one failure; must be pure
    fn classify(&self, error: &BackendError) -> ErrorClass;
}

/// Status and substring matcher used unless another classifier is injected
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultClassifier;

impl DefaultClassifier {
    /// Whether the text carries a quota or rate-limit signature
    #[must_use]
    pub fn is_quota_text(text: &str) -> bool {
        let lower = text.to_ascii_lowercase();
        QUOTA_SIGNATURES.iter().any(|sig| lower.contains(sig))
            || lower
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(|word| word == "429")
    }
}

impl ErrorClassifier for DefaultClassifier {
    fn classify(&self, error: &BackendError) -> ErrorClass {
        match error {
            BackendError::Http { status, .. } if *status == TOO_MANY_REQUESTS => {
                ErrorClass::QuotaExhausted
            }
            BackendError::Http { message, .. } if Self::is_quota_text(message) => {
                ErrorClass::QuotaExhausted
            }
            BackendError::Network(message) if Self::is_quota_text(message) => {
                ErrorClass::QuotaExhausted
            }
            BackendError::Timeout { .. } | BackendError::Network(_) => ErrorClass::Transient,
            // Auth and decode text comes from our side of the wire; "quota
            // project" warnings from gcloud must not look like exhaustion.
            BackendError::Http { .. } | BackendError::Auth(_) | BackendError::Decode(_) => {
                ErrorClass::Fatal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn classify(error: &BackendError) -> ErrorClass {
        DefaultClassifier.classify(error)
    }

    #[test]
    fn test_status_429_is_quota() {
        let err = BackendError::Http {
            status: 429,
            message: String::new(),
        };
        assert_eq!(classify(&err), ErrorClass::QuotaExhausted);
    }

    #[test]
    fn test_quota_text_any_case() {
        for message in [
            "RESOURCE_EXHAUSTED: Quota exceeded",
            "Resource has been exhausted (e.g. check quota).",
            "Rate Limit reached for requests",
            "Too Many Requests",
        ] {
            let err = BackendError::Http {
                status: 400,
                message: message.into(),
            };
            assert_eq!(classify(&err), ErrorClass::QuotaExhausted, "{message}");
        }
    }

    #[test]
    fn test_quota_signature_in_network_error() {
        let err = BackendError::Network("upstream said 429".into());
        assert_eq!(classify(&err), ErrorClass::QuotaExhausted);
    }

    #[test]
    fn test_auth_failure_mentioning_quota_is_fatal() {
        let err = BackendError::Auth(
            "gcloud auth failed: WARNING: Cannot add the project \"lab\" to ADC as the quota project"
                .into(),
        );
        assert_eq!(classify(&err), ErrorClass::Fatal);
        assert_eq!(
            classify(&BackendError::Decode("quota field missing".into())),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_429_must_stand_alone() {
        let err = BackendError::Http {
            status: 400,
            message: "INVALID_ARGUMENT: Request contains 14290 tokens".into(),
        };
        assert_eq!(classify(&err), ErrorClass::Fatal);

        let err = BackendError::Http {
            status: 500,
            message: "upstream returned 429".into(),
        };
        assert_eq!(classify(&err), ErrorClass::QuotaExhausted);
    }

    #[test]
    fn test_transport_failures_are_transient() {
        let timeout = BackendError::Timeout {
            after: Duration::from_secs(120),
        };
        assert_eq!(classify(&timeout), ErrorClass::Transient);
        assert_eq!(
            classify(&BackendError::Network("connection reset".into())),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_everything_else_is_fatal() {
        let bad_request = BackendError::Http {
            status: 400,
            message: "INVALID_ARGUMENT: unknown field".into(),
        };
        assert_eq!(classify(&bad_request), ErrorClass::Fatal);
        assert_eq!(
            classify(&BackendError::Auth("no identity".into())),
            ErrorClass::Fatal
        );
        assert_eq!(
            classify(&BackendError::Http {
                status: 503,
                message: "UNAVAILABLE".into()
            }),
            ErrorClass::Fatal
        );
    }
}
