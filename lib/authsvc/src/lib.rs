//! Authentication: credential/refresh-token stores, the bearer-token
//! issuer/verifier, and the orchestrating `AuthService`, generalized from
//! serial-key authentication to full username/password registration and
//! login.

pub mod model;
pub mod service;
pub mod store;
pub mod token;

pub use model::{Claims, RefreshTokenRecord, TokenPair, UserRecord, UserStatus};
pub use service::{AuthService, AuthServiceConfig};
pub use store::{CredentialStore, InMemoryCredentialStore, InMemoryRefreshTokenStore, RefreshTokenStore};
pub use token::{Algorithm, TokenIssuer};
