use serde::{Deserialize, Serialize};

use crate::db::User;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Public view of a user; the password hash never appears here.
#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub group: String,
    pub is_active: bool,
    pub is_superuser: bool,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            group: user.group,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    #[serde(default = "default_group")]
    pub group: String,
    pub password: String,
}

/// Admin-create may also set the privilege and active flags.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub username: String,
    #[serde(default = "default_group")]
    pub group: String,
    pub password: String,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_group() -> String {
    "users".to_string()
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

const fn default_limit() -> u64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub user_id: Option<i32>,
}

/// Login either yields a token or the non-exceptional rejection sentinel.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Token { token: String },
    Rejected { access: &'static str },
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub access: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}
