#![allow(dead_code)]

use billsplit::application::engine::BillEngine;
use billsplit::domain::ports::UserStoreHandle;
use billsplit::domain::user::User;
use billsplit::infrastructure::identity::SessionIdentityProvider;
use billsplit::infrastructure::in_memory::{
    InMemoryBillStore, InMemoryLinkStore, InMemoryUserStore,
};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const HEADER: &str = "op, user, target, description, amount, password, name";

pub fn in_memory_engine() -> BillEngine {
    let users: UserStoreHandle = Arc::new(InMemoryUserStore::new());
    BillEngine::new(
        Box::new(InMemoryBillStore::new()),
        users.clone(),
        Box::new(InMemoryLinkStore::new()),
        Box::new(SessionIdentityProvider::new(users)),
    )
}

/// Registers a user and resolves them back through their session token.
pub async fn sign_up(engine: &BillEngine, email: &str, name: &str) -> User {
    let payload = engine.signup(email, "password", name).await.unwrap();
    engine
        .authenticate(Some(payload.token.as_str()))
        .await
        .unwrap()
        .unwrap()
}

/// Writes a request script with the standard header.
pub fn script(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}
