use crate::application::engine::BillEngine;
use crate::domain::bill::{Bill, Item};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

const HEADER: [&str; 6] = [
    "bill",
    "description",
    "amount",
    "paid_by",
    "items",
    "items_total",
];

/// One line of the final bill report.
#[derive(Debug, Serialize, PartialEq)]
pub struct BillRow {
    pub bill: u64,
    pub description: String,
    pub amount: Decimal,
    pub paid_by: Option<u64>,
    pub items: usize,
    pub items_total: Decimal,
}

impl BillRow {
    pub fn new(bill: &Bill, items: &[Item]) -> Self {
        let items_total: Decimal = items.iter().map(|item| item.amount.value()).sum();
        Self {
            bill: bill.id.0,
            description: bill.description.to_string(),
            amount: bill.amount.value().normalize(),
            paid_by: bill.paid_by.map(|user| user.0),
            items: items.len(),
            items_total: items_total.normalize(),
        }
    }
}

/// Collects one report row per bill, in bill id order.
pub async fn report(engine: &BillEngine) -> Result<Vec<BillRow>> {
    let mut rows = Vec::new();
    for bill in engine.bills().await? {
        let items = engine.items_of(&bill).await?;
        rows.push(BillRow::new(&bill, &items));
    }
    Ok(rows)
}

/// Writes the bill report as CSV. The header is written even when there are
/// no bills.
pub struct BillWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> BillWriter<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(sink);
        Self { writer }
    }

    pub fn write_bills(&mut self, rows: impl IntoIterator<Item = BillRow>) -> Result<()> {
        self.writer.write_record(HEADER)?;
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
