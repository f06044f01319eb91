//! Session-aware API gateway library.

// Core subsystems
pub mod auth;
pub mod config;
pub mod http;
pub mod net;
pub mod upstream;

// Request policy
pub mod captcha;
pub mod csrf;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
