//! HTTP surface for Beeper Relay.
//!
//! Accepts Sentry webhooks on `POST /webhook`, validates them and hands
//! them to the [`br_core::AlertRelay`] held in [`AppState`].

pub mod dto;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod webhooks;

pub use error::{ApiError, ErrorResponse};
pub use middleware::{IpAllowlist, RequestId};
pub use server::{shutdown_signal, ApiServer, ApiServerConfig};
pub use state::AppState;
pub use webhooks::{compute_signature, verify_signature, WebhookRejection, WebhookValidator};
