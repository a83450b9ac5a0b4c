//! Authentication: the identity provider contract and its implementations.
//!
//! - `IdentityProvider`: what the app needs from an identity service
//! - `FirebaseAuth`: Firebase Auth REST implementation with a persisted
//!   `Session` and refresh tokens kept in the OS keychain
//! - `MemoryIdentityProvider`: in-process accounts for tests and offline use

mod credentials;
mod error;
mod firebase;
mod identity;
mod memory;
mod session;

pub use credentials::RefreshTokenStore;
pub use error::AuthError;
pub use firebase::FirebaseAuth;
pub use identity::{Identity, IdentityProvider, TokenCell};
pub use memory::MemoryIdentityProvider;
pub use session::{Session, SessionData};
