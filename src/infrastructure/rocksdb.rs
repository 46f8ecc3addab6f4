use crate::domain::bill::{Bill, BillDraft, BillId, BillPatch, Item, ItemDraft, ItemId};
use crate::domain::gate::{Guarded, Precondition};
use crate::domain::link::{Link, LinkId, NewLink};
use crate::domain::ports::{BillStore, LinkStore, UserStore};
use crate::domain::user::{NewUser, User, UserId};
use crate::error::{BillError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Column Family for bills.
pub const CF_BILLS: &str = "bills";
/// Column Family for items, keyed by item id.
pub const CF_ITEMS: &str = "items";
/// Column Family for users, keyed by user id.
pub const CF_USERS: &str = "users";
/// Column Family mapping emails to user ids.
pub const CF_USER_EMAILS: &str = "user_emails";
/// Column Family for links.
pub const CF_LINKS: &str = "links";
/// Column Family holding the id sequences.
pub const CF_META: &str = "meta";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_BILLS,
    CF_ITEMS,
    CF_USERS,
    CF_USER_EMAILS,
    CF_LINKS,
    CF_META,
];

const SEQ_BILL: &str = "seq:bill";
const SEQ_ITEM: &str = "seq:item";
const SEQ_USER: &str = "seq:user";
const SEQ_LINK: &str = "seq:link";

/// A persistent store implementation using RocksDB.
///
/// Every entity kind lives in its own Column Family with big-endian id keys,
/// so iteration follows creation order. Values are JSON.
///
/// Check-then-write sections (guarded writes, id allocation, unique emails)
/// run under a single writer mutex and commit through one `WriteBatch`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that all required column families exist.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::default(),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| BillError::internal(format!("{name} column family not found")))
    }

    fn get<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let mut values = Vec::new();
        for entry in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_key, value) = entry?;
            values.push(decode(&value)?);
        }
        Ok(values)
    }

    fn put<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        batch.put_cf(self.cf(cf)?, key, encode(value)?);
        Ok(())
    }

    /// Allocates the next id of a sequence. Callers must hold the writer lock
    /// and commit `batch`.
    fn next_id(&self, batch: &mut WriteBatch, sequence: &str) -> Result<u64> {
        let last: u64 = self.get(CF_META, sequence.as_bytes())?.unwrap_or(0);
        let next = last + 1;
        self.put(batch, CF_META, sequence.as_bytes(), &next)?;
        Ok(next)
    }

    /// Loads a bill and checks it against the precondition.
    fn guard(&self, id: BillId, expected: Precondition) -> Result<Guarded<Bill>> {
        Ok(match self.get::<Bill>(CF_BILLS, &id.0.to_be_bytes())? {
            None => Guarded::Missing,
            Some(bill) if expected.admits(&bill) => Guarded::Applied(bill),
            Some(_) => Guarded::Refused,
        })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| BillError::InternalError(Box::new(e)))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| BillError::InternalError(Box::new(e)))
}

#[async_trait]
impl BillStore for RocksDBStore {
    async fn create_bill(&self, draft: BillDraft) -> Result<Bill> {
        let _writer = self.writer.lock().await;
        let mut batch = WriteBatch::default();
        let bill = Bill::new(BillId(self.next_id(&mut batch, SEQ_BILL)?), draft);
        self.put(&mut batch, CF_BILLS, &bill.id.0.to_be_bytes(), &bill)?;
        self.db.write(batch)?;
        debug!(bill = %bill.id, "bill persisted");
        Ok(bill)
    }

    async fn find_bill(&self, id: BillId) -> Result<Option<Bill>> {
        self.get(CF_BILLS, &id.0.to_be_bytes())
    }

    async fn update_bill(
        &self,
        id: BillId,
        expected: Precondition,
        patch: BillPatch,
    ) -> Result<Guarded<Bill>> {
        let _writer = self.writer.lock().await;
        let mut bill = match self.guard(id, expected)? {
            Guarded::Applied(bill) => bill,
            Guarded::Missing => return Ok(Guarded::Missing),
            Guarded::Refused => return Ok(Guarded::Refused),
        };
        bill.apply(patch);
        self.db
            .put_cf(self.cf(CF_BILLS)?, id.0.to_be_bytes(), encode(&bill)?)?;
        Ok(Guarded::Applied(bill))
    }

    async fn delete_bill(&self, id: BillId, expected: Precondition) -> Result<Guarded<Bill>> {
        let _writer = self.writer.lock().await;
        let bill = match self.guard(id, expected)? {
            Guarded::Applied(bill) => bill,
            Guarded::Missing => return Ok(Guarded::Missing),
            Guarded::Refused => return Ok(Guarded::Refused),
        };
        let mut batch = WriteBatch::default();
        let items_cf = self.cf(CF_ITEMS)?;
        for item in self.scan::<Item>(CF_ITEMS)? {
            if item.bill == id {
                batch.delete_cf(items_cf, item.id.0.to_be_bytes());
            }
        }
        batch.delete_cf(self.cf(CF_BILLS)?, id.0.to_be_bytes());
        self.db.write(batch)?;
        debug!(bill = %id, "bill and items removed");
        Ok(Guarded::Applied(bill))
    }

    async fn create_item(
        &self,
        bill: BillId,
        expected: Precondition,
        draft: ItemDraft,
    ) -> Result<Guarded<Item>> {
        let _writer = self.writer.lock().await;
        if let Some(rejected) = self.guard(bill, expected)?.map(|_| ()).rejection() {
            return Ok(rejected);
        }
        let mut batch = WriteBatch::default();
        let item = Item::new(ItemId(self.next_id(&mut batch, SEQ_ITEM)?), bill, draft);
        self.put(&mut batch, CF_ITEMS, &item.id.0.to_be_bytes(), &item)?;
        self.db.write(batch)?;
        Ok(Guarded::Applied(item))
    }

    async fn find_item(&self, id: ItemId) -> Result<Option<Item>> {
        self.get(CF_ITEMS, &id.0.to_be_bytes())
    }

    async fn update_item(
        &self,
        id: ItemId,
        expected: Precondition,
        draft: ItemDraft,
    ) -> Result<Guarded<Item>> {
        let _writer = self.writer.lock().await;
        let Some(mut item) = self.get::<Item>(CF_ITEMS, &id.0.to_be_bytes())? else {
            return Ok(Guarded::Missing);
        };
        if let Some(rejected) = self.guard(item.bill, expected)?.map(|_| ()).rejection() {
            return Ok(rejected);
        }
        item.apply(draft);
        self.db
            .put_cf(self.cf(CF_ITEMS)?, id.0.to_be_bytes(), encode(&item)?)?;
        Ok(Guarded::Applied(item))
    }

    async fn delete_item(&self, id: ItemId, expected: Precondition) -> Result<Guarded<Item>> {
        let _writer = self.writer.lock().await;
        let Some(item) = self.get::<Item>(CF_ITEMS, &id.0.to_be_bytes())? else {
            return Ok(Guarded::Missing);
        };
        if let Some(rejected) = self.guard(item.bill, expected)?.map(|_| ()).rejection() {
            return Ok(rejected);
        }
        self.db.delete_cf(self.cf(CF_ITEMS)?, id.0.to_be_bytes())?;
        Ok(Guarded::Applied(item))
    }

    async fn items_of(&self, bill: BillId) -> Result<Vec<Item>> {
        let mut items = self.scan::<Item>(CF_ITEMS)?;
        items.retain(|item| item.bill == bill);
        Ok(items)
    }

    async fn bills_paid_by(&self, user: UserId) -> Result<Vec<Bill>> {
        let mut bills = self.scan::<Bill>(CF_BILLS)?;
        bills.retain(|bill| bill.is_paid_by(user));
        Ok(bills)
    }

    async fn all_bills(&self) -> Result<Vec<Bill>> {
        self.scan(CF_BILLS)
    }
}

#[async_trait]
impl UserStore for RocksDBStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let _writer = self.writer.lock().await;
        if self
            .get::<UserId>(CF_USER_EMAILS, user.email.as_bytes())?
            .is_some()
        {
            return Err(BillError::EmailTaken(user.email));
        }
        let mut batch = WriteBatch::default();
        let user = user.into_user(UserId(self.next_id(&mut batch, SEQ_USER)?));
        self.put(&mut batch, CF_USERS, &user.id.0.to_be_bytes(), &user)?;
        self.put(&mut batch, CF_USER_EMAILS, user.email.as_bytes(), &user.id)?;
        self.db.write(batch)?;
        Ok(user)
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        self.get(CF_USERS, &id.0.to_be_bytes())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.get::<UserId>(CF_USER_EMAILS, email.as_bytes())? {
            Some(id) => self.get(CF_USERS, &id.0.to_be_bytes()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LinkStore for RocksDBStore {
    async fn create_link(&self, link: NewLink) -> Result<Link> {
        let _writer = self.writer.lock().await;
        let mut batch = WriteBatch::default();
        let link = link.into_link(LinkId(self.next_id(&mut batch, SEQ_LINK)?));
        self.put(&mut batch, CF_LINKS, &link.id.0.to_be_bytes(), &link)?;
        self.db.write(batch)?;
        Ok(link)
    }

    async fn find_link(&self, id: LinkId) -> Result<Option<Link>> {
        self.get(CF_LINKS, &id.0.to_be_bytes())
    }

    async fn links_posted_by(&self, user: UserId) -> Result<Vec<Link>> {
        let mut links = self.scan::<Link>(CF_LINKS)?;
        links.retain(|link| link.posted_by == Some(user));
        Ok(links)
    }
}
