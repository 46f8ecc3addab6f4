use super::request_reader::Request;
use crate::application::engine::{BillEngine, Outcome};
use crate::domain::ports::SessionToken;
use crate::domain::user::User;
use crate::error::{BillError, Result};
use crate::infrastructure::identity::bearer_token;
use std::collections::HashMap;
use tracing::{debug, info};

/// What a script row produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Mutation(Outcome),
    Me(User),
}

/// Plays a request script against the engine.
///
/// Acts as the request layer: it remembers the session token each email got
/// from its last signup or login, presents it as an `Authorization` header and
/// authenticates every row through the identity provider. Rows from emails
/// without a session are anonymous.
pub struct ScriptRunner<'a> {
    engine: &'a BillEngine,
    sessions: HashMap<String, SessionToken>,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(engine: &'a BillEngine) -> Self {
        Self {
            engine,
            sessions: HashMap::new(),
        }
    }

    pub async fn run(&mut self, request: Request) -> Result<Reply> {
        let header = request
            .user
            .as_deref()
            .and_then(|email| self.sessions.get(email.trim()))
            .map(|token| format!("Bearer {}", token.as_str()));
        let token = header
            .as_deref()
            .map(|header| bearer_token(header).ok_or(BillError::Unauthenticated))
            .transpose()?;
        let actor = self.engine.authenticate(token).await?;
        debug!(op = ?request.op, authenticated = actor.is_some(), "running request");

        let Some(mutation) = request.into_mutation()? else {
            let user = self.engine.me(actor.as_ref())?;
            info!(user = %user.id, email = %user.email, "current user");
            return Ok(Reply::Me(user));
        };

        let outcome = self.engine.execute(actor.as_ref(), mutation).await?;
        if let Outcome::Auth(payload) = &outcome {
            self.sessions
                .insert(payload.user.email.clone(), payload.token.clone());
        }
        Ok(Reply::Mutation(outcome))
    }
}
