//! Backend API subsystem.
//!
//! # Data Flow
//! ```text
//! InboundRequest
//!     → forward.rs (rewrite path, pick headers, attach bearer)
//!     → transport.rs (reqwest, timeouts, one retry on dropped connections)
//!     → 401? → refresh.rs (POST /auth/refresh) → re-send once
//!     → forward.rs (copy status, body, allowed headers into GatewayResponse)
//!
//! Readiness:
//!     health.rs → GET /healthcheck
//! ```
//!
//! # Design Decisions
//! - One `BackendTransport` trait at the seam so handlers and the forwarder
//!   run against a scripted transport in tests
//! - Header policy lives in one place (`headers.rs`) as allow-lists

pub mod endpoint;
pub mod forward;
pub mod headers;
pub mod health;
pub mod refresh;
pub mod transport;

#[cfg(test)]
pub mod testing;

pub use endpoint::BackendUrl;
pub use forward::{ForwardError, ForwardOutcome, Forwarder};
pub use health::HealthcheckError;
pub use refresh::{RefreshClient, RefreshError};
pub use transport::{
    BackendResponse, BackendTransport, OutboundRequest, ReqwestTransport, TransportError, TransportSettings,
};
