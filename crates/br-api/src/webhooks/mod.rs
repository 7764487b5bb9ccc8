//! Sentry webhook validation.

pub mod headers;
pub mod pipeline;
pub mod signature;
pub mod timestamp;

pub use headers::SentryHeaders;
pub use pipeline::{ValidatedWebhook, WebhookRejection, WebhookValidator};
pub use signature::{compute_signature, verify_signature};
pub use timestamp::{is_timestamp_valid, is_timestamp_valid_at, DEFAULT_TOLERANCE_SECS};
