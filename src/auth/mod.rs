//! Session credentials subsystem.
//!
//! # Data Flow
//! ```text
//! Cookie header
//!     → cookie.rs (read access/refresh/CSRF cookies)
//!     → tokens.rs (Auth value: logged in? refreshable?)
//!     → claims.rs (unverified decode → "<sub>:<iat>" session identity)
//!
//! Response
//!     ← cookie.rs (Set-Cookie for new tokens, deletion cookies on logout)
//! ```
//!
//! # Design Decisions
//! - Cookie attributes come from an explicit `CookieConfig`, never globals
//! - Tokens are opaque; the gateway never verifies signatures
//! - Claim decoding is a typed decode that returns errors, never panics

pub mod claims;
pub mod cookie;
pub mod tokens;

pub use claims::{extract_session_identity, ClaimsError};
pub use cookie::{CookieCodec, CookieConfig, CsrfCookie};
pub use tokens::Auth;
