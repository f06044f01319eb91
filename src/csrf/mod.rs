//! CSRF protection subsystem.
//!
//! # Data Flow
//! ```text
//! Cookie header → CsrfContext (cookie token + "<sub>:<iat>" identity)
//!     → guard.rs (check against store, run handler, rotate)
//!     → store.rs (Redis or in-memory `get` / `set_ex`)
//! ```

pub mod guard;
pub mod store;

pub use guard::{csrf_middleware, CsrfCheck, CsrfContext, CsrfError, CsrfGuard, CSRF_KEY_PREFIX};
pub use store::{MemoryTokenStore, RedisTokenStore, StoreError, TokenStore};
