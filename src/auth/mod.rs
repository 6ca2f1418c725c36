//! Access-token authentication with role-based access control.
//!
//! Requests carry `Authorization: Bearer <access token>`. The gateway
//! verifies it statelessly and applies the role policy; refreshing is left
//! to the client, which calls `/refresh` explicitly.

pub mod cookie;
mod errors;
mod extractors;
mod gateway;
mod ip;
pub mod password;
mod policy;
mod state;

pub use errors::{AuthError, ErrorBody};
pub use extractors::{Authenticated, BearerToken};
pub use gateway::{AccessDecision, AuthGateway, authorization_header, bearer_token};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use policy::{AdminOnly, AnyRole, RoleConstraint, require_role};
pub use state::HasAuthBackend;
