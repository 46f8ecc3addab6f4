use crate::domain::user::UserId;
use crate::error::{BillError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for BillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A strictly positive monetary amount carried by bills and items.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(BillError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = BillError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Free-text label of a bill or item. Never blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Description(String);

impl Description {
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(BillError::ValidationError(
                "Description must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A shared bill.
///
/// `paid_by` is the claim: unset until someone pays the bill, then fixed for
/// the rest of the bill's life. Only the payer may mutate the bill or its items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: BillId,
    pub created_at: DateTime<Utc>,
    pub description: Description,
    pub amount: Amount,
    pub paid_by: Option<UserId>,
}

impl Bill {
    pub fn new(id: BillId, draft: BillDraft) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            description: draft.description,
            amount: draft.amount,
            paid_by: None,
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.paid_by.is_some()
    }

    pub fn is_paid_by(&self, user: UserId) -> bool {
        self.paid_by == Some(user)
    }

    /// Applies a patch. A claim is only recorded while the bill is unclaimed.
    pub fn apply(&mut self, patch: BillPatch) {
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(payer) = patch.paid_by
            && self.paid_by.is_none()
        {
            self.paid_by = Some(payer);
        }
    }
}

/// Fields supplied when creating a bill.
#[derive(Debug, Clone, PartialEq)]
pub struct BillDraft {
    pub description: Description,
    pub amount: Amount,
}

/// A partial update to a bill. There is no way to express clearing `paid_by`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BillPatch {
    pub description: Option<Description>,
    pub amount: Option<Amount>,
    pub paid_by: Option<UserId>,
}

impl BillPatch {
    pub fn claim(payer: UserId) -> Self {
        Self {
            paid_by: Some(payer),
            ..Self::default()
        }
    }

    pub fn details(description: Description, amount: Amount) -> Self {
        Self {
            description: Some(description),
            amount: Some(amount),
            paid_by: None,
        }
    }
}

/// A line item attached to exactly one bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub created_at: DateTime<Utc>,
    pub description: Description,
    pub amount: Amount,
    pub bill: BillId,
}

impl Item {
    pub fn new(id: ItemId, bill: BillId, draft: ItemDraft) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            description: draft.description,
            amount: draft.amount,
            bill,
        }
    }

    pub fn apply(&mut self, draft: ItemDraft) {
        self.description = draft.description;
        self.amount = draft.amount;
    }
}

/// Fields supplied when creating or replacing an item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDraft {
    pub description: Description,
    pub amount: Amount,
}
