//! Officer authentication
//!
//! Officers log in through an [`Authenticator`] and receive a bearer token;
//! every admin route checks that token and records its subject as the actor.

mod jwt;
mod middleware;
mod officer;

pub use jwt::{Claims, IssuedToken, TokenIssuer};
pub use middleware::require_officer;
pub use officer::{Authenticator, OfficerCredentials, SharedSecretAuthenticator};
