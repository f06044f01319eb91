//! Axum middleware functions mounted by the server.
//!
//! # Data Flow
//! ```text
//! metrics.rs  (count + latency, outermost of the gateway's own layers)
//!     → cors.rs (decorate responses for allowed origins)
//!     → csrf guard (crate::csrf, when enabled)
//!     → defaults.rs (client IP in, default Content-Type out)
//!     → handler
//! ```

pub mod cors;
pub mod defaults;
pub mod metrics;

pub use cors::{cors_middleware, CorsPolicy};
pub use defaults::defaults_middleware;
pub use metrics::metrics_middleware;
