use axum::http::HeaderMap;
use bson::Uuid;
use log::debug;
use serde::Deserialize;

use crate::error::ReviewError;

/// Header set by the gateway for authenticated requests.
pub const AUTHORIZED_USER_HEADER: &str = "Authorized-User";

/// Role of an authenticated user.
#[derive(Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Employee,
    Admin,
    /// Any role this service does not act on.
    #[serde(other)]
    Unknown,
}

/// Content of the `Authorized-User` header.
#[derive(Deserialize, Debug, Clone)]
pub struct AuthorizedUserHeader {
    pub id: Uuid,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl TryFrom<&HeaderMap> for AuthorizedUserHeader {
    type Error = ReviewError;

    fn try_from(headers: &HeaderMap) -> Result<Self, Self::Error> {
        let value = headers
            .get(AUTHORIZED_USER_HEADER)
            .ok_or(ReviewError::Unauthorized)?;
        let value = value.to_str().map_err(|_| ReviewError::Unauthorized)?;
        serde_json::from_str(value).map_err(|e| {
            debug!("Rejected `{}` header: {}", AUTHORIZED_USER_HEADER, e);
            ReviewError::Unauthorized
        })
    }
}

/// Identity of the caller of a service operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl CallerIdentity {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }

    /// Reads the caller from request headers, `None` when absent or malformed.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        AuthorizedUserHeader::try_from(headers).ok().map(Self::from)
    }

    /// True if the caller may act on a resource owned by `owner_id`.
    pub fn owns_or_moderates(&self, owner_id: Uuid) -> bool {
        self.is_admin || self.user_id == owner_id
    }
}

impl From<AuthorizedUserHeader> for CallerIdentity {
    fn from(header: AuthorizedUserHeader) -> Self {
        Self {
            user_id: header.id,
            is_admin: header.roles.contains(&Role::Admin),
        }
    }
}

/// Fails with `Unauthorized` if there is no caller.
pub fn authenticated(caller: Option<&CallerIdentity>) -> Result<&CallerIdentity, ReviewError> {
    caller.ok_or(ReviewError::Unauthorized)
}

/// Fails with `Unauthorized` if there is no caller and `Forbidden` if the caller is no admin.
pub fn require_admin(caller: Option<&CallerIdentity>) -> Result<&CallerIdentity, ReviewError> {
    let caller = authenticated(caller)?;
    if caller.is_admin {
        Ok(caller)
    } else {
        Err(ReviewError::forbidden("admin role required"))
    }
}
