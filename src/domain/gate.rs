//! Authorization vocabulary shared by the engine and the stores.
//!
//! Every mutation kind declares the ordered gates it must pass. The engine
//! evaluates them in order and stops at the first failure; the store re-checks
//! the last ownership gate as a [`Precondition`] inside the write itself.

use crate::domain::bill::Bill;
use crate::domain::user::UserId;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Signup,
    Login,
    CreateBill,
    PayBill,
    UpdateBill,
    DeleteBill,
    CreateItem,
    UpdateItem,
    DeleteItem,
}

/// An ordered precondition check in the authorization pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// The request carries an authenticated user.
    Authenticated,
    /// The target bill exists. For item operations the item is resolved first
    /// and its parent bill is the target.
    BillExists,
    /// The bill has no payer yet.
    Unclaimed,
    /// The bill's payer is the acting user.
    PayerIsActor,
}

impl MutationKind {
    pub const ALL: [Self; 9] = [
        Self::Signup,
        Self::Login,
        Self::CreateBill,
        Self::PayBill,
        Self::UpdateBill,
        Self::DeleteBill,
        Self::CreateItem,
        Self::UpdateItem,
        Self::DeleteItem,
    ];

    pub const fn gates(self) -> &'static [Gate] {
        match self {
            Self::Signup | Self::Login => &[],
            Self::CreateBill => &[Gate::Authenticated],
            Self::PayBill => &[Gate::Authenticated, Gate::BillExists, Gate::Unclaimed],
            Self::UpdateBill
            | Self::DeleteBill
            | Self::CreateItem
            | Self::UpdateItem
            | Self::DeleteItem => &[Gate::Authenticated, Gate::BillExists, Gate::PayerIsActor],
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Login => "login",
            Self::CreateBill => "create_bill",
            Self::PayBill => "pay_bill",
            Self::UpdateBill => "update_bill",
            Self::DeleteBill => "delete_bill",
            Self::CreateItem => "create_item",
            Self::UpdateItem => "update_item",
            Self::DeleteItem => "delete_item",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The claim state a store must observe on the bill at write time for a
/// guarded write to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    Unclaimed,
    PaidBy(UserId),
}

impl Precondition {
    /// Derives the write-time precondition from a kind's gates, if it has one.
    pub fn for_gates(gates: &[Gate], actor: UserId) -> Option<Self> {
        gates.iter().rev().find_map(|gate| match gate {
            Gate::Unclaimed => Some(Self::Unclaimed),
            Gate::PayerIsActor => Some(Self::PaidBy(actor)),
            Gate::Authenticated | Gate::BillExists => None,
        })
    }

    pub fn admits(&self, bill: &Bill) -> bool {
        match self {
            Self::Unclaimed => bill.paid_by.is_none(),
            Self::PaidBy(user) => bill.is_paid_by(*user),
        }
    }
}

/// Outcome of a guarded store write.
#[derive(Debug, Clone, PartialEq)]
pub enum Guarded<T> {
    Applied(T),
    /// The target (or its parent bill) does not exist.
    Missing,
    /// The bill's claim state did not satisfy the precondition; nothing was written.
    Refused,
}

impl<T> Guarded<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Missing | Self::Refused => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Guarded<U> {
        match self {
            Self::Applied(value) => Guarded::Applied(f(value)),
            Self::Missing => Guarded::Missing,
            Self::Refused => Guarded::Refused,
        }
    }
}

impl Guarded<()> {
    /// Turns a failed check into the outcome of the write it was guarding.
    pub fn rejection<T>(self) -> Option<Guarded<T>> {
        match self {
            Self::Applied(()) => None,
            Self::Missing => Some(Guarded::Missing),
            Self::Refused => Some(Guarded::Refused),
        }
    }
}
