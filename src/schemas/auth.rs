use serde::Serialize;

use crate::db::types::UserRole;
use crate::schemas::user::UserResponse;

/// Login result. The role is repeated at the top level so clients can keep
/// the token and role together.
#[derive(Debug, Serialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    pub(crate) token_type: String,
    pub(crate) role: UserRole,
    pub(crate) user: UserResponse,
}
