//! Identity extractor bridging the upstream authentication layer.
//!
//! The surrounding product authenticates requests before they reach this
//! engine and installs a stable numeric user id and display name as
//! headers. Handlers never see a request without them.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{dto::validation::validate_username, error::AppError, state::roster::UserId};

const USER_ID_HEADER: &str = "x-user-id";
const USER_NAME_HEADER: &str = "x-user-name";

/// The authenticated player issuing the current request.
pub struct CurrentUser {
    /// Stable numeric user id.
    pub id: UserId,
    /// Display name supplied per request.
    pub name: String,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<UserId>().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(format!("missing or malformed {USER_ID_HEADER} header"))
            })?;

        let name = parts
            .headers
            .get(USER_NAME_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::Unauthorized(format!("missing {USER_NAME_HEADER} header"))
            })?;
        validate_username(&name).map_err(|err| AppError::Unauthorized(err.to_string()))?;

        Ok(CurrentUser { id, name })
    }
}
