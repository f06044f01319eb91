//! Network layer subsystem.
//!
//! TLS termination is optional; when enabled the server is bound through
//! `axum-server` with a rustls config loaded from PEM files.

pub mod tls;

pub use tls::load_tls_config;
