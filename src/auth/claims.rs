use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::dto::PublicUser;

/// JWT payload: registered claims plus the flattened user projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,      // user ID
    pub iat: usize,     // issued at (unix timestamp)
    pub exp: usize,     // expires at (unix timestamp)
    pub iss: String,    // issuer
    pub aud: String,    // audience
    pub jti: Uuid,      // unique per issued token
    #[serde(flatten)]
    pub user: PublicUser,
}

impl Claims {
    /// Drops the registered claims, leaving the user projection.
    pub fn into_user(self) -> PublicUser {
        self.user
    }
}
