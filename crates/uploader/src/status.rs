//! Response classification.
//!
//! Every endpoint answer is classified exactly once into a [`StatusClass`];
//! the engine then switches on the variant.

use std::collections::BTreeSet;

use chunkup_protocol::STATUS_OK;
use chunkup_protocol::constants::is_create_success;

use crate::transport::{Response, TransportError};

/// Outcome of one endpoint call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusClass<T> {
    /// Accepted; carries the payload the caller needs.
    Success(T),
    /// Permanently rejected. Abort without retrying.
    Fatal(u16),
    /// Anything else: timeouts, 5xx, rate limits, transport failures.
    Retryable(String),
}

/// The endpoint-defined set of fatal statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPolicy {
    fatal: BTreeSet<u16>,
}

impl StatusPolicy {
    pub fn new(fatal: impl IntoIterator<Item = u16>) -> Self {
        Self {
            fatal: fatal.into_iter().collect(),
        }
    }

    pub fn is_fatal(&self, status: u16) -> bool {
        self.fatal.contains(&status)
    }

    /// Classifies a chunk or status answer. Success needs a 200 **with** a
    /// body, since the body carries the authoritative offset.
    pub fn classify<T>(&self, result: Result<Response<T>, TransportError>) -> StatusClass<T> {
        match result {
            Ok(Response {
                status: STATUS_OK,
                body: Some(body),
            }) => StatusClass::Success(body),
            Ok(resp) if self.is_fatal(resp.status) => StatusClass::Fatal(resp.status),
            Ok(resp) if resp.status == STATUS_OK => {
                StatusClass::Retryable("response without payload".into())
            }
            Ok(resp) => StatusClass::Retryable(format!("unexpected status {}", resp.status)),
            Err(e) => StatusClass::Retryable(e.to_string()),
        }
    }

    /// Classifies a `create` answer, where 304 (resumable) also succeeds
    /// and the body is optional.
    pub fn classify_create<T>(
        &self,
        result: Result<Response<T>, TransportError>,
    ) -> StatusClass<Option<T>> {
        match result {
            Ok(resp) if is_create_success(resp.status) => StatusClass::Success(resp.body),
            Ok(resp) if self.is_fatal(resp.status) => StatusClass::Fatal(resp.status),
            Ok(resp) => StatusClass::Retryable(format!("unexpected status {}", resp.status)),
            Err(e) => StatusClass::Retryable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> StatusPolicy {
        StatusPolicy::new([404, 409])
    }

    #[test]
    fn ok_with_body_is_success() {
        let class = policy().classify(Ok(Response::ok(7u64)));
        assert_eq!(class, StatusClass::Success(7));
    }

    #[test]
    fn ok_without_body_is_retryable() {
        let class = policy().classify::<u64>(Ok(Response::status(200)));
        assert!(matches!(class, StatusClass::Retryable(_)));
    }

    #[test]
    fn configured_status_is_fatal() {
        let class = policy().classify::<u64>(Ok(Response::status(409)));
        assert_eq!(class, StatusClass::Fatal(409));
    }

    #[test]
    fn fatal_set_is_not_hardcoded() {
        let strict = StatusPolicy::new([503]);
        assert_eq!(
            strict.classify::<u64>(Ok(Response::status(503))),
            StatusClass::Fatal(503)
        );
        assert!(matches!(
            strict.classify::<u64>(Ok(Response::status(409))),
            StatusClass::Retryable(_)
        ));
    }

    #[test]
    fn transport_error_is_retryable() {
        let class = policy().classify::<u64>(Err(TransportError::Io("reset".into())));
        assert_eq!(class, StatusClass::Retryable("I/O error: reset".into()));
    }

    #[test]
    fn create_accepts_not_modified_without_body() {
        let class = policy().classify_create::<u64>(Ok(Response::status(304)));
        assert_eq!(class, StatusClass::Success(None));
    }

    #[test]
    fn create_fatal_and_retryable() {
        assert_eq!(
            policy().classify_create::<u64>(Ok(Response::status(404))),
            StatusClass::Fatal(404)
        );
        assert!(matches!(
            policy().classify_create::<u64>(Ok(Response::status(502))),
            StatusClass::Retryable(_)
        ));
    }
}
