use crate::domain::bill::{
    Amount, Bill, BillDraft, BillId, BillPatch, Description, Item, ItemDraft, ItemId,
};
use crate::domain::gate::{Gate, Guarded, MutationKind, Precondition};
use crate::domain::link::Link;
use crate::domain::ports::{
    BillStoreBox, IdentityProviderBox, LinkStoreBox, SessionToken, UserStoreHandle,
};
use crate::domain::user::{CredentialHash, NewUser, User};
use crate::error::{BillError, EntityRef, Result};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// A mutation request, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Signup {
        email: String,
        password: String,
        name: String,
    },
    Login {
        email: String,
        password: String,
    },
    CreateBill {
        description: String,
        amount: Decimal,
    },
    PayBill {
        bill: BillId,
    },
    UpdateBill {
        bill: BillId,
        description: String,
        amount: Decimal,
    },
    DeleteBill {
        bill: BillId,
    },
    CreateItem {
        bill: BillId,
        description: String,
        amount: Decimal,
    },
    UpdateItem {
        item: ItemId,
        description: String,
        amount: Decimal,
    },
    DeleteItem {
        item: ItemId,
    },
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::Signup { .. } => MutationKind::Signup,
            Self::Login { .. } => MutationKind::Login,
            Self::CreateBill { .. } => MutationKind::CreateBill,
            Self::PayBill { .. } => MutationKind::PayBill,
            Self::UpdateBill { .. } => MutationKind::UpdateBill,
            Self::DeleteBill { .. } => MutationKind::DeleteBill,
            Self::CreateItem { .. } => MutationKind::CreateItem,
            Self::UpdateItem { .. } => MutationKind::UpdateItem,
            Self::DeleteItem { .. } => MutationKind::DeleteItem,
        }
    }
}

/// Session token and user returned by signup and login.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthPayload {
    pub token: SessionToken,
    pub user: User,
}

/// The entity produced by a successful mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Auth(AuthPayload),
    Bill(Bill),
    Item(Item),
}

/// What a mutation addresses, before the gates resolve it to a bill.
#[derive(Debug, Clone, Copy)]
enum Target {
    Nothing,
    Bill(BillId),
    Item(ItemId),
}

impl Target {
    fn entity(self) -> Option<EntityRef> {
        match self {
            Self::Nothing => None,
            Self::Bill(id) => Some(EntityRef::Bill(id)),
            Self::Item(id) => Some(EntityRef::Item(id)),
        }
    }
}

/// Everything the gates established for a request that passed them.
struct Clearance<A> {
    kind: MutationKind,
    actor: Option<User>,
    bill: Option<Bill>,
    args: A,
}

impl<A> Clearance<A> {
    fn actor(&self) -> Result<&User> {
        self.actor.as_ref().ok_or_else(|| {
            BillError::internal(format!("{} has no authentication gate", self.kind))
        })
    }

    fn bill(&self) -> Result<&Bill> {
        self.bill
            .as_ref()
            .ok_or_else(|| BillError::internal(format!("{} has no bill gate", self.kind)))
    }

    /// The condition the store must re-check when writing.
    fn precondition(&self) -> Result<Precondition> {
        let actor = self.actor()?.id;
        Precondition::for_gates(self.kind.gates(), actor).ok_or_else(|| {
            BillError::internal(format!("{} has no ownership gate", self.kind))
        })
    }
}

/// The bill authorization engine.
///
/// Every mutation runs the gates its kind declares, in order, and stops at the
/// first failure. Writes are only issued once all gates pass, and they carry
/// the ownership gate as a precondition the store checks atomically.
pub struct BillEngine {
    bills: BillStoreBox,
    users: UserStoreHandle,
    links: LinkStoreBox,
    identity: IdentityProviderBox,
}

impl BillEngine {
    /// Creates a new `BillEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `bills` - The store for bills and their items.
    /// * `users` - The user store, shared with the identity provider.
    /// * `links` - The store for links posted by users.
    /// * `identity` - Issues and resolves session tokens.
    pub fn new(
        bills: BillStoreBox,
        users: UserStoreHandle,
        links: LinkStoreBox,
        identity: IdentityProviderBox,
    ) -> Self {
        Self {
            bills,
            users,
            links,
            identity,
        }
    }

    /// Resolves request credentials through the identity provider.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Option<User>> {
        self.identity.authenticate(token).await
    }

    /// Dispatches a tagged mutation to its operation.
    pub async fn execute(&self, actor: Option<&User>, mutation: Mutation) -> Result<Outcome> {
        match mutation {
            Mutation::Signup {
                email,
                password,
                name,
            } => self
                .signup(&email, &password, &name)
                .await
                .map(Outcome::Auth),
            Mutation::Login { email, password } => {
                self.login(&email, &password).await.map(Outcome::Auth)
            }
            Mutation::CreateBill {
                description,
                amount,
            } => self
                .create_bill(actor, &description, amount)
                .await
                .map(Outcome::Bill),
            Mutation::PayBill { bill } => self.pay_bill(actor, bill).await.map(Outcome::Bill),
            Mutation::UpdateBill {
                bill,
                description,
                amount,
            } => self
                .update_bill(actor, bill, &description, amount)
                .await
                .map(Outcome::Bill),
            Mutation::DeleteBill { bill } => {
                self.delete_bill(actor, bill).await.map(Outcome::Bill)
            }
            Mutation::CreateItem {
                bill,
                description,
                amount,
            } => self
                .create_item(actor, bill, &description, amount)
                .await
                .map(Outcome::Item),
            Mutation::UpdateItem {
                item,
                description,
                amount,
            } => self
                .update_item(actor, item, &description, amount)
                .await
                .map(Outcome::Item),
            Mutation::DeleteItem { item } => {
                self.delete_item(actor, item).await.map(Outcome::Item)
            }
        }
    }

    pub async fn signup(&self, email: &str, password: &str, name: &str) -> Result<AuthPayload> {
        let clearance = self
            .authorize(MutationKind::Signup, None, Target::Nothing, || {
                Ok(NewUser {
                    name: required("name", name)?,
                    email: required("email", email)?,
                    credential: CredentialHash::derive(secret(password)?)?,
                })
            })
            .await?;
        let user = self.users.create_user(clearance.args).await?;
        let token = self.identity.issue(&user).await?;
        info!(user = %user.id, "user signed up");
        Ok(AuthPayload { token, user })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthPayload> {
        self.authorize(MutationKind::Login, None, Target::Nothing, || Ok(()))
            .await?;
        let user = self
            .users
            .find_user_by_email(email.trim())
            .await?
            .filter(|user| user.credential.verify(password))
            .ok_or(BillError::InvalidCredentials)?;
        let token = self.identity.issue(&user).await?;
        info!(user = %user.id, "user logged in");
        Ok(AuthPayload { token, user })
    }

    /// Creates an unclaimed bill. The creator is not recorded as payer.
    pub async fn create_bill(
        &self,
        actor: Option<&User>,
        description: &str,
        amount: Decimal,
    ) -> Result<Bill> {
        let clearance = self
            .authorize(MutationKind::CreateBill, actor, Target::Nothing, || {
                Ok(BillDraft {
                    description: Description::new(description)?,
                    amount: Amount::new(amount)?,
                })
            })
            .await?;
        let creator = clearance.actor()?.id;
        let bill = self.bills.create_bill(clearance.args).await?;
        info!(bill = %bill.id, creator = %creator, "bill created");
        Ok(bill)
    }

    /// Claims an unclaimed bill for the acting user.
    pub async fn pay_bill(&self, actor: Option<&User>, bill: BillId) -> Result<Bill> {
        let clearance = self
            .authorize(MutationKind::PayBill, actor, Target::Bill(bill), || Ok(()))
            .await?;
        let payer = clearance.actor()?.id;
        let outcome = self
            .bills
            .update_bill(bill, clearance.precondition()?, BillPatch::claim(payer))
            .await?;
        let paid = settle(&clearance, Target::Bill(bill), outcome)?;
        info!(bill = %bill, payer = %payer, "bill claimed");
        Ok(paid)
    }

    pub async fn update_bill(
        &self,
        actor: Option<&User>,
        bill: BillId,
        description: &str,
        amount: Decimal,
    ) -> Result<Bill> {
        let clearance = self
            .authorize(MutationKind::UpdateBill, actor, Target::Bill(bill), || {
                Ok(BillPatch::details(
                    Description::new(description)?,
                    Amount::new(amount)?,
                ))
            })
            .await?;
        let precondition = clearance.precondition()?;
        let outcome = self
            .bills
            .update_bill(bill, precondition, clearance.args.clone())
            .await?;
        let updated = settle(&clearance, Target::Bill(bill), outcome)?;
        info!(bill = %bill, "bill updated");
        Ok(updated)
    }

    /// Deletes a bill and, with it, all of its items.
    pub async fn delete_bill(&self, actor: Option<&User>, bill: BillId) -> Result<Bill> {
        let clearance = self
            .authorize(MutationKind::DeleteBill, actor, Target::Bill(bill), || Ok(()))
            .await?;
        let outcome = self
            .bills
            .delete_bill(bill, clearance.precondition()?)
            .await?;
        let deleted = settle(&clearance, Target::Bill(bill), outcome)?;
        info!(bill = %bill, "bill deleted");
        Ok(deleted)
    }

    pub async fn create_item(
        &self,
        actor: Option<&User>,
        bill: BillId,
        description: &str,
        amount: Decimal,
    ) -> Result<Item> {
        let clearance = self
            .authorize(MutationKind::CreateItem, actor, Target::Bill(bill), || {
                Ok(ItemDraft {
                    description: Description::new(description)?,
                    amount: Amount::new(amount)?,
                })
            })
            .await?;
        let precondition = clearance.precondition()?;
        let outcome = self
            .bills
            .create_item(bill, precondition, clearance.args.clone())
            .await?;
        let item = settle(&clearance, Target::Bill(bill), outcome)?;
        info!(bill = %bill, item = %item.id, "item added");
        Ok(item)
    }

    pub async fn update_item(
        &self,
        actor: Option<&User>,
        item: ItemId,
        description: &str,
        amount: Decimal,
    ) -> Result<Item> {
        let clearance = self
            .authorize(MutationKind::UpdateItem, actor, Target::Item(item), || {
                Ok(ItemDraft {
                    description: Description::new(description)?,
                    amount: Amount::new(amount)?,
                })
            })
            .await?;
        let precondition = clearance.precondition()?;
        let outcome = self
            .bills
            .update_item(item, precondition, clearance.args.clone())
            .await?;
        let updated = settle(&clearance, Target::Item(item), outcome)?;
        info!(bill = %updated.bill, item = %item, "item updated");
        Ok(updated)
    }

    pub async fn delete_item(&self, actor: Option<&User>, item: ItemId) -> Result<Item> {
        let clearance = self
            .authorize(MutationKind::DeleteItem, actor, Target::Item(item), || Ok(()))
            .await?;
        let outcome = self
            .bills
            .delete_item(item, clearance.precondition()?)
            .await?;
        let deleted = settle(&clearance, Target::Item(item), outcome)?;
        info!(bill = %deleted.bill, item = %item, "item deleted");
        Ok(deleted)
    }

    /// The current user, or `Unauthenticated` if the request carries none.
    pub fn me(&self, actor: Option<&User>) -> Result<User> {
        actor.cloned().ok_or(BillError::Unauthenticated)
    }

    pub async fn bill(&self, id: BillId) -> Result<Bill> {
        self.bills
            .find_bill(id)
            .await?
            .ok_or(BillError::NotFound(EntityRef::Bill(id)))
    }

    pub async fn bills(&self) -> Result<Vec<Bill>> {
        self.bills.all_bills().await
    }

    pub async fn items_of(&self, bill: &Bill) -> Result<Vec<Item>> {
        self.bills.items_of(bill.id).await
    }

    /// The bill's payer; `None` while the bill is unclaimed.
    pub async fn payer_of(&self, bill: &Bill) -> Result<Option<User>> {
        match bill.paid_by {
            Some(payer) => self.users.find_user(payer).await,
            None => Ok(None),
        }
    }

    pub async fn bill_of(&self, item: &Item) -> Result<Bill> {
        self.bill(item.bill).await
    }

    /// Bills the user has paid.
    pub async fn bills_of(&self, user: &User) -> Result<Vec<Bill>> {
        self.bills.bills_paid_by(user.id).await
    }

    pub async fn links_of(&self, user: &User) -> Result<Vec<Link>> {
        self.links.links_posted_by(user.id).await
    }

    /// Runs the gates of `kind` in order.
    ///
    /// Arguments are validated right after the caller is authenticated and
    /// before anything is read from the store.
    async fn authorize<A>(
        &self,
        kind: MutationKind,
        actor: Option<&User>,
        target: Target,
        validate: impl FnOnce() -> Result<A>,
    ) -> Result<Clearance<A>> {
        let mut validate = Some(validate);
        let mut args = None;
        let mut clearance_actor = None;
        let mut clearance_bill: Option<Bill> = None;

        for gate in kind.gates() {
            match gate {
                Gate::Authenticated => {
                    clearance_actor = Some(actor.cloned().ok_or(BillError::Unauthenticated)?);
                    if let Some(validate) = validate.take() {
                        args = Some(validate()?);
                    }
                }
                Gate::BillExists => {
                    clearance_bill = Some(self.resolve_bill(target).await?);
                }
                Gate::Unclaimed => {
                    let bill = gate_input(kind, clearance_bill.as_ref())?;
                    if bill.is_claimed() {
                        return Err(BillError::AlreadyPaid(bill.id));
                    }
                }
                Gate::PayerIsActor => {
                    let bill = gate_input(kind, clearance_bill.as_ref())?;
                    let user = gate_input(kind, clearance_actor.as_ref())?;
                    if !bill.is_paid_by(user.id) {
                        return Err(BillError::Forbidden {
                            bill: bill.id,
                            action: kind,
                        });
                    }
                }
            }
        }

        let args = match (args, validate) {
            (Some(args), _) => args,
            (None, Some(validate)) => validate()?,
            (None, None) => return Err(BillError::internal("arguments validated twice")),
        };
        debug!(kind = %kind, "gates passed");
        Ok(Clearance {
            kind,
            actor: clearance_actor,
            bill: clearance_bill,
            args,
        })
    }

    /// Resolves the bill a mutation addresses; item targets resolve to their
    /// parent bill.
    async fn resolve_bill(&self, target: Target) -> Result<Bill> {
        let id = match target {
            Target::Bill(id) => id,
            Target::Item(item) => {
                self.bills
                    .find_item(item)
                    .await?
                    .ok_or(BillError::NotFound(EntityRef::Item(item)))?
                    .bill
            }
            Target::Nothing => return Err(BillError::internal("bill gate without a target")),
        };
        self.bill(id).await
    }
}

fn gate_input<T>(kind: MutationKind, value: Option<&T>) -> Result<&T> {
    value.ok_or_else(|| BillError::internal(format!("gates of {kind} are out of order")))
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BillError::ValidationError(format!(
            "{field} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

/// Passwords are taken verbatim; only emptiness is rejected.
fn secret(password: &str) -> Result<&str> {
    if password.is_empty() {
        return Err(BillError::ValidationError(
            "password must not be empty".to_string(),
        ));
    }
    Ok(password)
}

/// Classifies a guarded write the same way the gates would have.
///
/// A refusal here means the claim changed after the gates ran.
fn settle<A, T>(clearance: &Clearance<A>, target: Target, outcome: Guarded<T>) -> Result<T> {
    match outcome {
        Guarded::Applied(value) => Ok(value),
        Guarded::Missing => {
            warn!(kind = %clearance.kind, "target vanished before the write");
            Err(target.entity().map_or_else(
                || BillError::internal("guarded write without a target"),
                BillError::NotFound,
            ))
        }
        Guarded::Refused => {
            let bill = clearance.bill()?.id;
            warn!(kind = %clearance.kind, bill = %bill, "claim changed before the write");
            match clearance.precondition()? {
                Precondition::Unclaimed => Err(BillError::AlreadyPaid(bill)),
                Precondition::PaidBy(_) => Err(BillError::Forbidden {
                    bill,
                    action: clearance.kind,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::BillStore;
    use crate::infrastructure::identity::SessionIdentityProvider;
    use crate::infrastructure::in_memory::{InMemoryBillStore, InMemoryLinkStore, InMemoryUserStore};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn engine() -> BillEngine {
        let users: UserStoreHandle = Arc::new(InMemoryUserStore::new());
        BillEngine::new(
            Box::new(InMemoryBillStore::new()),
            users.clone(),
            Box::new(InMemoryLinkStore::new()),
            Box::new(SessionIdentityProvider::new(users)),
        )
    }

    async fn user(engine: &BillEngine, email: &str) -> User {
        engine.signup(email, "pw", "Someone").await.unwrap().user
    }

    #[tokio::test]
    async fn test_create_bill_leaves_payer_unset() {
        let engine = engine();
        let alice = user(&engine, "alice@example.com").await;

        let bill = engine
            .create_bill(Some(&alice), "dinner", dec!(40))
            .await
            .unwrap();
        assert_eq!(bill.paid_by, None);
        assert_eq!(bill.amount.value(), dec!(40));
    }

    #[tokio::test]
    async fn test_unclaimed_bill_is_immutable_even_for_creator() {
        let engine = engine();
        let alice = user(&engine, "alice@example.com").await;
        let bill = engine
            .create_bill(Some(&alice), "dinner", dec!(40))
            .await
            .unwrap();

        let update = engine
            .update_bill(Some(&alice), bill.id, "lunch", dec!(10))
            .await;
        assert!(matches!(update, Err(BillError::Forbidden { .. })));
        let delete = engine.delete_bill(Some(&alice), bill.id).await;
        assert!(matches!(delete, Err(BillError::Forbidden { .. })));
        let item = engine
            .create_item(Some(&alice), bill.id, "tip", dec!(5))
            .await;
        assert!(matches!(
            item,
            Err(BillError::Forbidden {
                action: MutationKind::CreateItem,
                ..
            })
        ));
        assert_eq!(engine.bill(bill.id).await.unwrap(), bill);
    }

    #[tokio::test]
    async fn test_pay_bill_claims_once() {
        let engine = engine();
        let alice = user(&engine, "alice@example.com").await;
        let bob = user(&engine, "bob@example.com").await;
        let bill = engine
            .create_bill(Some(&alice), "dinner", dec!(40))
            .await
            .unwrap();

        let paid = engine.pay_bill(Some(&alice), bill.id).await.unwrap();
        assert_eq!(paid.paid_by, Some(alice.id));

        let again = engine.pay_bill(Some(&alice), bill.id).await;
        assert!(matches!(again, Err(BillError::AlreadyPaid(id)) if id == bill.id));
        let other = engine.pay_bill(Some(&bob), bill.id).await;
        assert!(matches!(other, Err(BillError::AlreadyPaid(_))));

        let stored = engine.bill(bill.id).await.unwrap();
        assert_eq!(stored.paid_by, Some(alice.id));
    }

    #[tokio::test]
    async fn test_gate_order_authentication_first() {
        let engine = engine();
        // Missing bill, missing user: authentication is reported first.
        let result = engine.pay_bill(None, BillId(42)).await;
        assert!(matches!(result, Err(BillError::Unauthenticated)));

        // Invalid arguments without a user: still unauthenticated.
        let result = engine.create_bill(None, "", dec!(-1)).await;
        assert!(matches!(result, Err(BillError::Unauthenticated)));
        assert!(engine.bills().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_precedes_existence() {
        let engine = engine();
        let alice = user(&engine, "alice@example.com").await;
        let result = engine
            .update_bill(Some(&alice), BillId(42), " ", dec!(10))
            .await;
        assert!(matches!(result, Err(BillError::ValidationError(_))));

        let result = engine
            .update_bill(Some(&alice), BillId(42), "lunch", dec!(10))
            .await;
        assert!(matches!(
            result,
            Err(BillError::NotFound(EntityRef::Bill(BillId(42))))
        ));
    }

    #[tokio::test]
    async fn test_item_operations_resolve_parent_bill() {
        let engine = engine();
        let alice = user(&engine, "alice@example.com").await;
        let bob = user(&engine, "bob@example.com").await;
        let bill = engine
            .create_bill(Some(&alice), "dinner", dec!(40))
            .await
            .unwrap();
        engine.pay_bill(Some(&alice), bill.id).await.unwrap();
        let tip = engine
            .create_item(Some(&alice), bill.id, "tip", dec!(5))
            .await
            .unwrap();

        let forbidden = engine
            .update_item(Some(&bob), tip.id, "tip", dec!(50))
            .await;
        assert!(matches!(
            forbidden,
            Err(BillError::Forbidden {
                action: MutationKind::UpdateItem,
                ..
            })
        ));

        let updated = engine
            .update_item(Some(&alice), tip.id, "tip", dec!(6))
            .await
            .unwrap();
        assert_eq!(updated.amount.value(), dec!(6));
        assert_eq!(engine.bill_of(&updated).await.unwrap().id, bill.id);

        let missing = engine.delete_item(Some(&alice), ItemId(99)).await;
        assert!(matches!(
            missing,
            Err(BillError::NotFound(EntityRef::Item(ItemId(99))))
        ));

        engine.delete_item(Some(&alice), tip.id).await.unwrap();
        assert!(engine.items_of(&bill).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_items_of_unclaimed_bill_are_locked() {
        let store = InMemoryBillStore::new();
        let users: UserStoreHandle = Arc::new(InMemoryUserStore::new());
        let engine = BillEngine::new(
            Box::new(store.clone()),
            users.clone(),
            Box::new(InMemoryLinkStore::new()),
            Box::new(SessionIdentityProvider::new(users)),
        );
        let alice = user(&engine, "alice@example.com").await;
        let bill = engine
            .create_bill(Some(&alice), "dinner", dec!(40))
            .await
            .unwrap();
        let seeded = store
            .create_item(
                bill.id,
                Precondition::Unclaimed,
                ItemDraft {
                    description: Description::new("starter").unwrap(),
                    amount: Amount::new(dec!(8)).unwrap(),
                },
            )
            .await
            .unwrap()
            .applied()
            .unwrap();

        let update = engine
            .update_item(Some(&alice), seeded.id, "main", dec!(20))
            .await;
        assert!(matches!(
            update,
            Err(BillError::Forbidden {
                bill: id,
                action: MutationKind::UpdateItem,
            }) if id == bill.id
        ));
        let delete = engine.delete_item(Some(&alice), seeded.id).await;
        assert!(matches!(
            delete,
            Err(BillError::Forbidden {
                bill: id,
                action: MutationKind::DeleteItem,
            }) if id == bill.id
        ));
        assert_eq!(engine.items_of(&bill).await.unwrap(), vec![seeded]);
    }

    #[tokio::test]
    async fn test_update_bill_is_idempotent() {
        let engine = engine();
        let alice = user(&engine, "alice@example.com").await;
        let bill = engine
            .create_bill(Some(&alice), "dinner", dec!(40))
            .await
            .unwrap();
        engine.pay_bill(Some(&alice), bill.id).await.unwrap();

        let first = engine
            .update_bill(Some(&alice), bill.id, "team dinner", dec!(55))
            .await
            .unwrap();
        let second = engine
            .update_bill(Some(&alice), bill.id, "team dinner", dec!(55))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(second.paid_by, Some(alice.id));
    }

    #[tokio::test]
    async fn test_delete_bill_cascades() {
        let engine = engine();
        let alice = user(&engine, "alice@example.com").await;
        let bill = engine
            .create_bill(Some(&alice), "dinner", dec!(40))
            .await
            .unwrap();
        engine.pay_bill(Some(&alice), bill.id).await.unwrap();
        let tip = engine
            .create_item(Some(&alice), bill.id, "tip", dec!(5))
            .await
            .unwrap();

        let deleted = engine.delete_bill(Some(&alice), bill.id).await.unwrap();
        assert_eq!(deleted.id, bill.id);
        assert!(matches!(
            engine.bill(bill.id).await,
            Err(BillError::NotFound(_))
        ));
        let item = engine.delete_item(Some(&alice), tip.id).await;
        assert!(matches!(
            item,
            Err(BillError::NotFound(EntityRef::Item(_)))
        ));
    }

    #[tokio::test]
    async fn test_signup_and_login() {
        let engine = engine();
        let payload = engine
            .signup("alice@example.com", "s3cret", "Alice")
            .await
            .unwrap();
        assert_eq!(payload.user.name, "Alice");

        let duplicate = engine.signup("alice@example.com", "x", "Other").await;
        assert!(matches!(duplicate, Err(BillError::EmailTaken(_))));

        let login = engine.login("alice@example.com", "s3cret").await.unwrap();
        assert_eq!(login.user.id, payload.user.id);
        assert_ne!(login.token, payload.token);

        let me = engine
            .authenticate(Some(login.token.as_str()))
            .await
            .unwrap();
        assert_eq!(engine.me(me.as_ref()).unwrap().id, payload.user.id);

        let wrong = engine.login("alice@example.com", "guess").await;
        assert!(matches!(wrong, Err(BillError::InvalidCredentials)));
        let unknown = engine.login("nobody@example.com", "s3cret").await;
        assert!(matches!(unknown, Err(BillError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_signup_validation() {
        let engine = engine();
        let result = engine.signup("alice@example.com", "", "Alice").await;
        assert!(matches!(result, Err(BillError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_me_requires_user() {
        let engine = engine();
        assert!(matches!(engine.me(None), Err(BillError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_execute_dispatches_by_kind() {
        let engine = engine();
        let Outcome::Auth(auth) = engine
            .execute(
                None,
                Mutation::Signup {
                    email: "alice@example.com".to_string(),
                    password: "pw".to_string(),
                    name: "Alice".to_string(),
                },
            )
            .await
            .unwrap()
        else {
            panic!("signup must yield an auth payload");
        };

        let create = Mutation::CreateBill {
            description: "dinner".to_string(),
            amount: dec!(40),
        };
        assert_eq!(create.kind(), MutationKind::CreateBill);
        let Outcome::Bill(bill) = engine.execute(Some(&auth.user), create).await.unwrap() else {
            panic!("create_bill must yield a bill");
        };

        let outcome = engine
            .execute(Some(&auth.user), Mutation::PayBill { bill: bill.id })
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Bill(paid) if paid.paid_by == Some(auth.user.id)));
    }

    #[tokio::test]
    async fn test_payer_and_bills_of_user() {
        let engine = engine();
        let alice = user(&engine, "alice@example.com").await;
        let bill = engine
            .create_bill(Some(&alice), "dinner", dec!(40))
            .await
            .unwrap();
        assert_eq!(engine.payer_of(&bill).await.unwrap(), None);

        let paid = engine.pay_bill(Some(&alice), bill.id).await.unwrap();
        assert_eq!(engine.payer_of(&paid).await.unwrap(), Some(alice.clone()));
        assert_eq!(engine.bills_of(&alice).await.unwrap(), vec![paid]);
        assert!(engine.links_of(&alice).await.unwrap().is_empty());
    }
}
