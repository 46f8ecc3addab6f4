use crate::domain::bill::{Bill, BillDraft, BillId, BillPatch, Item, ItemDraft, ItemId};
use crate::domain::gate::{Guarded, Precondition};
use crate::domain::link::{Link, LinkId, NewLink};
use crate::domain::ports::{BillStore, LinkStore, UserStore};
use crate::domain::user::{NewUser, User, UserId};
use crate::error::{BillError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct BillTables {
    bills: BTreeMap<BillId, Bill>,
    items: BTreeMap<ItemId, Item>,
    last_bill: u64,
    last_item: u64,
}

impl BillTables {
    /// Checks the precondition against the bill, if it exists.
    fn check(&self, id: BillId, expected: Precondition) -> Guarded<()> {
        match self.bills.get(&id) {
            None => Guarded::Missing,
            Some(bill) if expected.admits(bill) => Guarded::Applied(()),
            Some(_) => Guarded::Refused,
        }
    }

    fn parent_of(&self, item: ItemId) -> Option<BillId> {
        self.items.get(&item).map(|item| item.bill)
    }
}

/// A thread-safe in-memory store for bills and items.
///
/// Bills and items share one lock, so every guarded write checks the claim
/// and applies its change while holding the write guard.
#[derive(Default, Clone)]
pub struct InMemoryBillStore {
    tables: Arc<RwLock<BillTables>>,
}

impl InMemoryBillStore {
    /// Creates a new, empty in-memory bill store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BillStore for InMemoryBillStore {
    async fn create_bill(&self, draft: BillDraft) -> Result<Bill> {
        let mut tables = self.tables.write().await;
        tables.last_bill += 1;
        let bill = Bill::new(BillId(tables.last_bill), draft);
        tables.bills.insert(bill.id, bill.clone());
        debug!(bill = %bill.id, "bill stored");
        Ok(bill)
    }

    async fn find_bill(&self, id: BillId) -> Result<Option<Bill>> {
        let tables = self.tables.read().await;
        Ok(tables.bills.get(&id).cloned())
    }

    async fn update_bill(
        &self,
        id: BillId,
        expected: Precondition,
        patch: BillPatch,
    ) -> Result<Guarded<Bill>> {
        let mut tables = self.tables.write().await;
        match tables.bills.get_mut(&id) {
            None => Ok(Guarded::Missing),
            Some(bill) if expected.admits(bill) => {
                bill.apply(patch);
                Ok(Guarded::Applied(bill.clone()))
            }
            Some(_) => Ok(Guarded::Refused),
        }
    }

    async fn delete_bill(&self, id: BillId, expected: Precondition) -> Result<Guarded<Bill>> {
        let mut tables = self.tables.write().await;
        if let Some(rejected) = tables.check(id, expected).rejection() {
            return Ok(rejected);
        }
        tables.items.retain(|_, item| item.bill != id);
        let removed = tables.bills.remove(&id);
        Ok(removed.map_or(Guarded::Missing, Guarded::Applied))
    }

    async fn create_item(
        &self,
        bill: BillId,
        expected: Precondition,
        draft: ItemDraft,
    ) -> Result<Guarded<Item>> {
        let mut tables = self.tables.write().await;
        if let Some(rejected) = tables.check(bill, expected).rejection() {
            return Ok(rejected);
        }
        tables.last_item += 1;
        let item = Item::new(ItemId(tables.last_item), bill, draft);
        tables.items.insert(item.id, item.clone());
        Ok(Guarded::Applied(item))
    }

    async fn find_item(&self, id: ItemId) -> Result<Option<Item>> {
        let tables = self.tables.read().await;
        Ok(tables.items.get(&id).cloned())
    }

    async fn update_item(
        &self,
        id: ItemId,
        expected: Precondition,
        draft: ItemDraft,
    ) -> Result<Guarded<Item>> {
        let mut tables = self.tables.write().await;
        let Some(bill) = tables.parent_of(id) else {
            return Ok(Guarded::Missing);
        };
        if let Some(rejected) = tables.check(bill, expected).rejection() {
            return Ok(rejected);
        }
        match tables.items.get_mut(&id) {
            Some(item) => {
                item.apply(draft);
                Ok(Guarded::Applied(item.clone()))
            }
            None => Ok(Guarded::Missing),
        }
    }

    async fn delete_item(&self, id: ItemId, expected: Precondition) -> Result<Guarded<Item>> {
        let mut tables = self.tables.write().await;
        let Some(bill) = tables.parent_of(id) else {
            return Ok(Guarded::Missing);
        };
        if let Some(rejected) = tables.check(bill, expected).rejection() {
            return Ok(rejected);
        }
        let removed = tables.items.remove(&id);
        Ok(removed.map_or(Guarded::Missing, Guarded::Applied))
    }

    async fn items_of(&self, bill: BillId) -> Result<Vec<Item>> {
        let tables = self.tables.read().await;
        Ok(tables
            .items
            .values()
            .filter(|item| item.bill == bill)
            .cloned()
            .collect())
    }

    async fn bills_paid_by(&self, user: UserId) -> Result<Vec<Bill>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bills
            .values()
            .filter(|bill| bill.is_paid_by(user))
            .cloned()
            .collect())
    }

    async fn all_bills(&self) -> Result<Vec<Bill>> {
        let tables = self.tables.read().await;
        Ok(tables.bills.values().cloned().collect())
    }
}

#[derive(Default)]
struct UserTables {
    users: HashMap<UserId, User>,
    by_email: HashMap<String, UserId>,
    last_user: u64,
}

/// A thread-safe in-memory store for registered users.
#[derive(Default, Clone)]
pub struct InMemoryUserStore {
    tables: Arc<RwLock<UserTables>>,
}

impl InMemoryUserStore {
    /// Creates a new, empty in-memory user store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.by_email.contains_key(&user.email) {
            return Err(BillError::EmailTaken(user.email));
        }
        tables.last_user += 1;
        let user = user.into_user(UserId(tables.last_user));
        tables.by_email.insert(user.email.clone(), user.id);
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_email
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }
}

/// A thread-safe in-memory store for links.
#[derive(Default, Clone)]
pub struct InMemoryLinkStore {
    links: Arc<RwLock<BTreeMap<LinkId, Link>>>,
}

impl InMemoryLinkStore {
    /// Creates a new, empty in-memory link store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkStore for InMemoryLinkStore {
    async fn create_link(&self, link: NewLink) -> Result<Link> {
        let mut links = self.links.write().await;
        let next = links.keys().next_back().map_or(1, |id| id.0 + 1);
        let link = link.into_link(LinkId(next));
        links.insert(link.id, link.clone());
        Ok(link)
    }

    async fn find_link(&self, id: LinkId) -> Result<Option<Link>> {
        let links = self.links.read().await;
        Ok(links.get(&id).cloned())
    }

    async fn links_posted_by(&self, user: UserId) -> Result<Vec<Link>> {
        let links = self.links.read().await;
        Ok(links
            .values()
            .filter(|link| link.posted_by == Some(user))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bill::{Amount, Description};
    use crate::domain::user::CredentialHash;
    use rust_decimal_macros::dec;

    fn draft(description: &str, amount: rust_decimal::Decimal) -> BillDraft {
        BillDraft {
            description: Description::new(description).unwrap(),
            amount: Amount::new(amount).unwrap(),
        }
    }

    fn item(description: &str, amount: rust_decimal::Decimal) -> ItemDraft {
        ItemDraft {
            description: Description::new(description).unwrap(),
            amount: Amount::new(amount).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_bill_store() {
        let store = InMemoryBillStore::new();
        let bill = store.create_bill(draft("dinner", dec!(40))).await.unwrap();
        assert_eq!(bill.id, BillId(1));
        assert!(bill.paid_by.is_none());

        let retrieved = store.find_bill(bill.id).await.unwrap().unwrap();
        assert_eq!(retrieved, bill);
        assert!(store.find_bill(BillId(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_applies_once() {
        let store = InMemoryBillStore::new();
        let bill = store.create_bill(draft("dinner", dec!(40))).await.unwrap();

        let first = store
            .update_bill(bill.id, Precondition::Unclaimed, BillPatch::claim(UserId(1)))
            .await
            .unwrap();
        assert_eq!(first.applied().unwrap().paid_by, Some(UserId(1)));

        let second = store
            .update_bill(bill.id, Precondition::Unclaimed, BillPatch::claim(UserId(2)))
            .await
            .unwrap();
        assert_eq!(second, Guarded::Refused);

        let stored = store.find_bill(bill.id).await.unwrap().unwrap();
        assert_eq!(stored.paid_by, Some(UserId(1)));
    }

    #[tokio::test]
    async fn test_guarded_item_writes() {
        let store = InMemoryBillStore::new();
        let bill = store.create_bill(draft("dinner", dec!(40))).await.unwrap();

        // Unclaimed: nobody can add items.
        let refused = store
            .create_item(bill.id, Precondition::PaidBy(UserId(1)), item("tip", dec!(5)))
            .await
            .unwrap();
        assert_eq!(refused, Guarded::Refused);

        store
            .update_bill(bill.id, Precondition::Unclaimed, BillPatch::claim(UserId(1)))
            .await
            .unwrap();
        let tip = store
            .create_item(bill.id, Precondition::PaidBy(UserId(1)), item("tip", dec!(5)))
            .await
            .unwrap()
            .applied()
            .unwrap();

        let updated = store
            .update_item(tip.id, Precondition::PaidBy(UserId(2)), item("tip", dec!(6)))
            .await
            .unwrap();
        assert_eq!(updated, Guarded::Refused);

        let missing = store
            .delete_item(ItemId(99), Precondition::PaidBy(UserId(1)))
            .await
            .unwrap();
        assert_eq!(missing, Guarded::Missing);
    }

    #[tokio::test]
    async fn test_delete_bill_cascades_items() {
        let store = InMemoryBillStore::new();
        let bill = store.create_bill(draft("dinner", dec!(40))).await.unwrap();
        let other = store.create_bill(draft("taxi", dec!(15))).await.unwrap();
        let payer = Precondition::PaidBy(UserId(1));
        for id in [bill.id, other.id] {
            store
                .update_bill(id, Precondition::Unclaimed, BillPatch::claim(UserId(1)))
                .await
                .unwrap();
        }
        let tip = store
            .create_item(bill.id, payer, item("tip", dec!(5)))
            .await
            .unwrap()
            .applied()
            .unwrap();
        let fare = store
            .create_item(other.id, payer, item("fare", dec!(15)))
            .await
            .unwrap()
            .applied()
            .unwrap();

        let deleted = store.delete_bill(bill.id, payer).await.unwrap();
        assert!(deleted.applied().is_some());
        assert!(store.find_bill(bill.id).await.unwrap().is_none());
        assert!(store.find_item(tip.id).await.unwrap().is_none());
        assert_eq!(store.find_item(fare.id).await.unwrap(), Some(fare));
    }

    #[tokio::test]
    async fn test_items_are_ordered_by_creation() {
        let store = InMemoryBillStore::new();
        let bill = store.create_bill(draft("dinner", dec!(40))).await.unwrap();
        store
            .update_bill(bill.id, Precondition::Unclaimed, BillPatch::claim(UserId(1)))
            .await
            .unwrap();
        for name in ["starter", "main", "dessert"] {
            store
                .create_item(bill.id, Precondition::PaidBy(UserId(1)), item(name, dec!(1)))
                .await
                .unwrap();
        }
        let names: Vec<_> = store
            .items_of(bill.id)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.description.as_str().to_string())
            .collect();
        assert_eq!(names, ["starter", "main", "dessert"]);
    }

    #[tokio::test]
    async fn test_in_memory_user_store_rejects_duplicate_email() {
        let store = InMemoryUserStore::new();
        let new_user = NewUser {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            credential: CredentialHash::derive("pw").unwrap(),
        };
        let alice = store.create_user(new_user.clone()).await.unwrap();
        assert_eq!(
            store.find_user_by_email("alice@example.com").await.unwrap(),
            Some(alice.clone())
        );
        assert_eq!(store.find_user(alice.id).await.unwrap(), Some(alice));

        let duplicate = store.create_user(new_user).await;
        assert!(matches!(duplicate, Err(BillError::EmailTaken(_))));
    }

    #[tokio::test]
    async fn test_in_memory_link_store() {
        let store = InMemoryLinkStore::new();
        let link = store
            .create_link(NewLink {
                description: "docs".to_string(),
                url: "https://docs.rs".to_string(),
                posted_by: Some(UserId(1)),
            })
            .await
            .unwrap();
        assert_eq!(store.find_link(link.id).await.unwrap(), Some(link.clone()));
        assert_eq!(store.links_posted_by(UserId(1)).await.unwrap(), vec![link]);
        assert!(store.links_posted_by(UserId(2)).await.unwrap().is_empty());
    }
}
