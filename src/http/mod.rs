//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware stack)
//!     → middleware/ (metrics, CORS, CSRF guard, default headers)
//!     → request.rs (buffered InboundRequest with client IP)
//!     → handlers.rs (captcha, forward, cookies, redirects)
//!     → response.rs (GatewayResponse → axum Response)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{ClientIp, InboundRequest};
pub use response::{ErrorResponse, GatewayResponse, RedirectResponse};
pub use server::{AppState, GatewayServer, Redirects, ServerSettings};
