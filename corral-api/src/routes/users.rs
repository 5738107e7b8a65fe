//! User lookup and creation endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use corral_core::User;
use corral_storage::Source;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::middleware::ClientIdentity;
use crate::state::AppState;
use crate::validation::{ValidateEmail, ValidateNonEmpty};

// ============================================================================
// TYPES
// ============================================================================

/// A looked-up user and where it was served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserResponse {
    /// "cache", "coalesced" or "db"
    pub source: &'static str,
    pub data: User,
}

/// Body of POST /users. Fields are optional so a missing one is reported as
/// a validation error rather than a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl CreateUserRequest {
    /// Validated `(name, email)`, both trimmed.
    fn into_fields(self) -> ApiResult<(String, String)> {
        self.name.validate_non_empty("name")?;
        self.email.validate_non_empty("email")?;
        let name = self.name.unwrap_or_default().trim().to_string();
        let email = self.email.unwrap_or_default().trim().to_string();
        email.validate_email("email")?;
        Ok((name, email))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateUserResponse {
    pub message: &'static str,
    pub data: User,
}

pub fn source_label(source: Source) -> &'static str {
    match source {
        Source::Cache => "cache",
        Source::Coalesced => "coalesced",
        Source::Fresh => "db",
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /users/:id - Rate-limited, cached, coalesced lookup
pub async fn get_user(
    State(state): State<AppState>,
    ClientIdentity(client): ClientIdentity,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<UserResponse>> {
    let lookup = state.service.lookup(&client, &raw_id).await?;
    Ok(Json(UserResponse {
        source: source_label(lookup.source),
        data: lookup.user,
    }))
}

/// POST /users - Create a user and write it through to the cache
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<CreateUserResponse>)> {
    let (name, email) = request.into_fields()?;
    let user = state.service.create_user(&name, &email);
    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            message: "User created",
            data: user,
        }),
    ))
}
