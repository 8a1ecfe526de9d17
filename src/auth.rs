//! Mock login
//!
//! Issues a fixed token for any well-formed email/password pair. There is no
//! credential check; OAuth providers are rejected.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{NewsdeskError, Result};

pub const MOCK_TOKEN: &str = "mock-jwt-token";
pub const EMAIL_PROVIDER: &str = "email";

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: Option<String>,
    pub password: Option<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn login(request: &LoginRequest) -> Result<LoginResponse> {
    if non_blank(&request.provider) != Some(EMAIL_PROVIDER) {
        return Err(NewsdeskError::ValidationError("Invalid provider".to_string()));
    }

    let (Some(email), Some(_password)) = (non_blank(&request.email), non_blank(&request.password))
    else {
        return Err(NewsdeskError::ValidationError(
            "Email and password are required".to_string(),
        ));
    };

    request
        .validate()
        .map_err(|_| NewsdeskError::ValidationError("Invalid email address".to_string()))?;

    let name = email.split('@').next().unwrap_or(email).to_string();
    let role = if email.contains("admin") { Role::Admin } else { Role::User };

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email: email.to_string(),
        name,
        role,
        provider: EMAIL_PROVIDER.to_string(),
    };

    Ok(LoginResponse {
        user,
        token: MOCK_TOKEN.to_string(),
    })
}
