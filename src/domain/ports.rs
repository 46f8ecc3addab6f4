use super::bill::{Bill, BillDraft, BillId, BillPatch, Item, ItemDraft, ItemId};
use super::gate::{Guarded, Precondition};
use super::link::{Link, LinkId, NewLink};
use super::user::{NewUser, User, UserId};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Persistence for bills and their items.
///
/// Guarded writes must evaluate the [`Precondition`] against the bill and
/// perform the write as one atomic step, so a concurrent claim can never slip
/// between the check and the write.
#[async_trait]
pub trait BillStore: Send + Sync {
    async fn create_bill(&self, draft: BillDraft) -> Result<Bill>;
    async fn find_bill(&self, id: BillId) -> Result<Option<Bill>>;
    async fn update_bill(
        &self,
        id: BillId,
        expected: Precondition,
        patch: BillPatch,
    ) -> Result<Guarded<Bill>>;
    /// Removes the bill together with all of its items.
    async fn delete_bill(&self, id: BillId, expected: Precondition) -> Result<Guarded<Bill>>;
    async fn create_item(
        &self,
        bill: BillId,
        expected: Precondition,
        draft: ItemDraft,
    ) -> Result<Guarded<Item>>;
    async fn find_item(&self, id: ItemId) -> Result<Option<Item>>;
    async fn update_item(
        &self,
        id: ItemId,
        expected: Precondition,
        draft: ItemDraft,
    ) -> Result<Guarded<Item>>;
    async fn delete_item(&self, id: ItemId, expected: Precondition) -> Result<Guarded<Item>>;
    /// Items of a bill in creation order.
    async fn items_of(&self, bill: BillId) -> Result<Vec<Item>>;
    async fn bills_paid_by(&self, user: UserId) -> Result<Vec<Bill>>;
    async fn all_bills(&self) -> Result<Vec<Bill>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `EmailTaken` when the email is already registered.
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn find_user(&self, id: UserId) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
}

#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn create_link(&self, link: NewLink) -> Result<Link>;
    async fn find_link(&self, id: LinkId) -> Result<Option<Link>>;
    async fn links_posted_by(&self, user: UserId) -> Result<Vec<Link>>;
}

/// Opaque session token handed out on signup and login.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Resolves request credentials into a user and mints new sessions.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` when no credential was presented; `Err(Unauthenticated)` when
    /// the credential is malformed or unknown.
    async fn authenticate(&self, token: Option<&str>) -> Result<Option<User>>;
    async fn issue(&self, user: &User) -> Result<SessionToken>;
}

pub type BillStoreBox = Box<dyn BillStore>;
pub type LinkStoreBox = Box<dyn LinkStore>;
pub type IdentityProviderBox = Box<dyn IdentityProvider>;
/// Users are shared between the engine and the identity provider.
pub type UserStoreHandle = Arc<dyn UserStore>;
