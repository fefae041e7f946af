//! Order accumulator shared by the X12 and EDIFACT state machines.
//!
//! Header segments write into the accumulator's header, item-start segments
//! flush the in-progress item, and the transaction trailer turns the whole
//! state into an order and resets.

use crate::model::{EdiStandard, Envelope, LineItem, NormalizedOrder, OrderHeader, TransactionKind};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderAccumulator {
    header: OrderHeader,
    items: Vec<LineItem>,
    current: Option<LineItem>,
}

impl OrderAccumulator {
    pub fn header(&self) -> &OrderHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut OrderHeader {
        &mut self.header
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn current_item(&self) -> Option<&LineItem> {
        self.current.as_ref()
    }

    /// Close the in-progress item. Items without a line number take their position.
    #[must_use]
    pub fn flush(mut self) -> Self {
        if let Some(mut item) = self.current.take() {
            if item.line_number == 0 {
                item.line_number = u32::try_from(self.items.len() + 1).unwrap_or(u32::MAX);
            }
            self.items.push(item);
        }
        self
    }

    /// Flush the prior item and make `item` the in-progress one.
    pub fn start_item(&mut self, item: LineItem) {
        *self = std::mem::take(self).flush();
        self.current = Some(item);
    }

    /// The in-progress item, starting an empty one when none is open.
    pub fn item_mut(&mut self) -> &mut LineItem {
        self.current.get_or_insert_with(LineItem::default)
    }

    /// Emit the accumulated order and reset. Unidentified orders are dropped.
    pub fn finish(
        &mut self,
        standard: EdiStandard,
        transaction: TransactionKind,
        envelope: &Envelope,
    ) -> Option<NormalizedOrder> {
        let done = std::mem::take(self).flush();
        if !done.header.is_identified() {
            return None;
        }
        Some(NormalizedOrder {
            header: done.header,
            items: done.items,
            standard,
            transaction,
            envelope: envelope.clone(),
        })
    }
}

/// Quantity text; absent or unreadable quantities count as one.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn parse_quantity(text: &str) -> i64 {
    let text = text.trim();
    if let Ok(quantity) = text.parse::<i64>() {
        return quantity;
    }
    match text.parse::<f64>() {
        Ok(quantity) if quantity.is_finite() => quantity.round() as i64,
        _ => 1,
    }
}

/// Decimal price text into whole cents.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn parse_cents(text: &str) -> Option<i64> {
    let price: f64 = text.trim().parse().ok()?;
    price.is_finite().then(|| (price * 100.0).round() as i64)
}

pub(crate) fn parse_line_number(text: &str) -> Option<u32> {
    text.trim().parse().ok().filter(|line| *line > 0)
}
