use crate::domain::ports::{IdentityProvider, SessionToken, UserStoreHandle};
use crate::domain::user::{User, UserId};
use crate::error::{BillError, Result};
use async_trait::async_trait;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const TOKEN_BYTES: usize = 32;

/// Extracts the token from an `Authorization` header value of the form
/// `Bearer <token>`.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[derive(Default)]
struct Sessions {
    by_token: HashMap<String, UserId>,
    by_user: HashMap<UserId, String>,
}

/// Identity provider backed by opaque random session tokens.
///
/// Sessions live in memory, one per user: issuing a token revokes the user's
/// previous one, so the table is bounded by the number of users. Users are
/// resolved through the shared user store on every request, so a deleted user
/// invalidates their session.
#[derive(Clone)]
pub struct SessionIdentityProvider {
    users: UserStoreHandle,
    sessions: Arc<RwLock<Sessions>>,
}

impl SessionIdentityProvider {
    pub fn new(users: UserStoreHandle) -> Self {
        Self {
            users,
            sessions: Arc::default(),
        }
    }
}

#[async_trait]
impl IdentityProvider for SessionIdentityProvider {
    async fn authenticate(&self, token: Option<&str>) -> Result<Option<User>> {
        let Some(token) = token else {
            return Ok(None);
        };
        let user_id = {
            let sessions = self.sessions.read().await;
            sessions.by_token.get(token).copied()
        };
        let Some(user_id) = user_id else {
            warn!("unknown session token presented");
            return Err(BillError::Unauthenticated);
        };
        match self.users.find_user(user_id).await? {
            Some(user) => Ok(Some(user)),
            None => {
                warn!(user = %user_id, "session refers to a missing user");
                Err(BillError::Unauthenticated)
            }
        }
    }

    async fn issue(&self, user: &User) -> Result<SessionToken> {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        let mut sessions = self.sessions.write().await;
        if let Some(previous) = sessions.by_user.insert(user.id, token.clone()) {
            sessions.by_token.remove(&previous);
            debug!(user = %user.id, "previous session revoked");
        }
        sessions.by_token.insert(token.clone(), user.id);
        debug!(user = %user.id, "session issued");
        Ok(SessionToken(token))
    }
}
