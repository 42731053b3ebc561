use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::error::ErrorUnauthorized;
use actix_web::{Error, FromRequest, HttpRequest};

/// Set by the upstream gateway after it has authenticated the session.
pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

const ADMIN_ROLE: &str = "admin";

/// The verified caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub is_admin: bool,
}

impl AuthenticatedUser {
    /// Owners see their own files, admins see everything.
    pub fn can_access(&self, owner_id: i64) -> bool {
        self.is_admin || self.id == owner_id
    }
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|h| h.to_str().ok())
}

/// Read the caller identity from the gateway headers.
pub fn identify(req: &HttpRequest) -> Result<AuthenticatedUser, Error> {
    let raw = header(req, USER_ID_HEADER).ok_or_else(|| ErrorUnauthorized("Missing user identity"))?;

    let id = raw.trim().parse::<i64>().map_err(|_| {
        log::warn!("Rejected malformed {} header", USER_ID_HEADER);
        ErrorUnauthorized("Invalid user identity")
    })?;

    let is_admin = header(req, USER_ROLE_HEADER)
        .map(|role| role.trim().eq_ignore_ascii_case(ADMIN_ROLE))
        .unwrap_or(false);

    Ok(AuthenticatedUser { id, is_admin })
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(identify(req))
    }
}
