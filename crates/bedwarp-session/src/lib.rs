//! Player identity and the session registry for bedwarp.
//!
//! 1. **Verification**: checking a login's signed identity documents
//!    ([`Authenticator`], [`ChainAuthenticator`]).
//! 2. **Players**: a verified [`Identity`] bound to the connection
//!    serving it ([`Player`], [`SessionHandle`]).
//! 3. **Registry**: who is connected right now ([`SessionRegistry`]).
//!
//! ```text
//! Proxy handler (above)  ← verifies logins, registers players
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Transport (below)  ← ConnectionId
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod jwt;
mod player;
mod registry;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use auth::{Authenticator, ChainAuthenticator, Identity};
pub use error::AuthError;
pub use player::{Player, PlayerId, SessionHandle};
pub use registry::SessionRegistry;
