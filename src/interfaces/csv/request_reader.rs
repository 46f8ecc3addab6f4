use crate::application::engine::Mutation;
use crate::domain::bill::{BillId, ItemId};
use crate::error::{BillError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum RequestOp {
    Signup,
    Login,
    Me,
    CreateBill,
    PayBill,
    UpdateBill,
    DeleteBill,
    CreateItem,
    UpdateItem,
    DeleteItem,
}

impl RequestOp {
    /// The op as written in the script.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Login => "login",
            Self::Me => "me",
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

/// One row of a request script.
///
/// `user` is the acting email. `target` is the bill id, or the item id for
/// `update_item` and `delete_item`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Request {
    pub op: RequestOp,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub target: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Request {
    /// Builds the mutation this row asks for. `me` is a query and yields `None`.
    pub fn into_mutation(self) -> Result<Option<Mutation>> {
        let op = self.op;
        let mutation = match op {
            RequestOp::Me => return Ok(None),
            RequestOp::Signup => Mutation::Signup {
                email: require(op, "user", self.user)?,
                password: require(op, "password", self.password)?,
                name: require(op, "name", self.name)?,
            },
            RequestOp::Login => Mutation::Login {
                email: require(op, "user", self.user)?,
                password: require(op, "password", self.password)?,
            },
            RequestOp::CreateBill => Mutation::CreateBill {
                description: require(op, "description", self.description)?,
                amount: require(op, "amount", self.amount)?,
            },
            RequestOp::PayBill => Mutation::PayBill {
                bill: BillId(require(op, "target", self.target)?),
            },
            RequestOp::UpdateBill => Mutation::UpdateBill {
                bill: BillId(require(op, "target", self.target)?),
                description: require(op, "description", self.description)?,
                amount: require(op, "amount", self.amount)?,
            },
            RequestOp::DeleteBill => Mutation::DeleteBill {
                bill: BillId(require(op, "target", self.target)?),
            },
            RequestOp::CreateItem => Mutation::CreateItem {
                bill: BillId(require(op, "target", self.target)?),
                description: require(op, "description", self.description)?,
                amount: require(op, "amount", self.amount)?,
            },
            RequestOp::UpdateItem => Mutation::UpdateItem {
                item: ItemId(require(op, "target", self.target)?),
                description: require(op, "description", self.description)?,
                amount: require(op, "amount", self.amount)?,
            },
            RequestOp::DeleteItem => Mutation::DeleteItem {
                item: ItemId(require(op, "target", self.target)?),
            },
        };
        Ok(Some(mutation))
    }
}

fn require<T>(op: RequestOp, column: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| {
        BillError::ValidationError(format!("{} requires the {column} column", op.as_str()))
    })
}

/// Reads requests from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<Request>`.
/// It handles whitespace trimming and short records automatically.
pub struct RequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RequestReader<R> {
    /// Creates a new `RequestReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes requests.
    pub fn requests(self) -> impl Iterator<Item = Result<Request>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(BillError::from))
    }
}
