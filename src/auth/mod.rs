pub mod capability;
pub mod handlers;
pub mod middleware;
pub mod model;

pub use capability::{CapabilityClaims, CapabilityTokenService, TokenError};
pub use handlers::*;
pub use middleware::*;
pub use model::*;
