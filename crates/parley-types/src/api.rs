use serde::{Deserialize, Serialize};

use crate::models::PublicUser;

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "repeatedPassword")]
    pub repeated_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Which input a structured auth failure is attributed to. Clients key their
/// field highlighting off this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthErrorType {
    Email,
    Username,
    Password,
}

/// Structured success/failure reply shared by /register and /login.
/// `errorType` is always present (null on success), matching what the
/// client expects; the message fields are filled per outcome.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(rename = "errorType")]
    pub error_type: Option<AuthErrorType>,
    #[serde(rename = "errorMessage", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<PublicUser>,
}

impl AuthResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            error_type: None,
            error_message: None,
            message: Some(message.into()),
            user: None,
        }
    }

    pub fn ok_user(message: impl Into<String>, user: PublicUser) -> Self {
        Self {
            user: Some(user),
            ..Self::ok(message)
        }
    }

    pub fn rejected(error_type: AuthErrorType, error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_type: Some(error_type),
            error_message: Some(error_message.into()),
            message: None,
            user: None,
        }
    }
}

// -- User admin --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteUserRequest {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteUserResponse {
    pub message: String,
}
