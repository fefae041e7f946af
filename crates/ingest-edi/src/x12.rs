//! X12 transaction state machine (850 purchase order, 856 ship notice, 810 invoice).

use tracing::trace;

use crate::accumulator::{OrderAccumulator, parse_cents, parse_line_number, parse_quantity};
use crate::model::{EdiStandard, Envelope, LineItem, NormalizedOrder, TransactionKind};
use crate::segment::{Segment, non_empty, split_x12};
use crate::syntax::X12Separators;
use crate::{Error, Result};

/// Parse every transaction of an X12 interchange.
pub fn parse(text: &str) -> Result<Vec<NormalizedOrder>> {
    let text = text.trim_start();
    let separators = X12Separators::from_isa(text);
    let segments = split_x12(text, separators);

    if !segments.iter().any(|segment| segment.tag == "ST") {
        return Err(Error::Parse {
            line: 1,
            column: 1,
            message: "no ST transaction header found".to_string(),
        });
    }

    let mut machine = X12Machine::default();
    let mut orders = Vec::new();
    for segment in &segments {
        if let Some(order) = machine.step(segment)? {
            orders.push(order);
        }
    }
    Ok(orders)
}

/// Segment-by-segment X12 parser state
#[derive(Debug, Clone, Default)]
pub struct X12Machine {
    envelope: Envelope,
    transaction: Option<TransactionKind>,
    in_ship_to: bool,
    order: OrderAccumulator,
}

impl X12Machine {
    pub fn transaction(&self) -> Option<TransactionKind> {
        self.transaction
    }

    pub fn accumulator(&self) -> &OrderAccumulator {
        &self.order
    }

    /// Apply one segment; returns an order when a transaction closes.
    pub fn step(&mut self, segment: &Segment) -> Result<Option<NormalizedOrder>> {
        trace!(tag = %segment.tag, "X12 segment");
        match segment.tag.as_str() {
            "ISA" => {
                self.envelope = Envelope {
                    sender_id: segment.value(5),
                    receiver_id: segment.value(7),
                    control_number: segment.value(12),
                };
                return Ok(None);
            }
            "ST" => {
                let code = segment.element(0);
                let kind = TransactionKind::from_code(EdiStandard::X12, code)
                    .ok_or_else(|| Error::unsupported(EdiStandard::X12, code))?;
                self.transaction = Some(kind);
                self.in_ship_to = false;
                self.order = OrderAccumulator::default();
                return Ok(None);
            }
            _ => {}
        }

        let Some(kind) = self.transaction else {
            return Ok(None);
        };

        match segment.tag.as_str() {
            "BEG" => self.order.header_mut().po_number = segment.value(2),
            "BSN" => self.order.header_mut().reference_number = segment.value(1),
            "PRF" => self.order.header_mut().po_number = segment.value(0),
            "BIG" => {
                let header = self.order.header_mut();
                header.reference_number = segment.value(1);
                header.po_number = segment.value(3);
            }
            "N1" => {
                self.in_ship_to = segment.element(0).eq_ignore_ascii_case("ST");
                if self.in_ship_to {
                    self.order.header_mut().recipient_name = segment.value(1);
                }
            }
            "N2" if self.in_ship_to => self.order.header_mut().recipient_company = segment.value(0),
            "N3" if self.in_ship_to => {
                let header = self.order.header_mut();
                header.address_line1 = segment.value(0);
                header.address_line2 = segment.value(1);
            }
            "N4" if self.in_ship_to => {
                let header = self.order.header_mut();
                header.city = segment.value(0);
                header.state = segment.value(1);
                header.postal_code = segment.value(2);
                header.country = segment.value(3);
            }
            "PER" if self.in_ship_to => self.apply_contact(segment),
            "PO1" | "IT1" => {
                self.in_ship_to = false;
                let mut item = LineItem::default().with_line_number(parse_line_number(segment.element(0)));
                item.quantity = parse_quantity(segment.element(1));
                item.unit_price_cents = parse_cents(segment.element(3));
                apply_product_pairs(&mut item, segment, 5);
                self.order.start_item(item);
            }
            "LIN" if kind == TransactionKind::ShipNotice => {
                self.in_ship_to = false;
                let mut item = LineItem::default().with_line_number(parse_line_number(segment.element(0)));
                apply_product_pairs(&mut item, segment, 1);
                self.order.start_item(item);
            }
            "SN1" => self.order.item_mut().quantity = parse_quantity(segment.element(1)),
            "PID" => {
                if let Some(description) = segment.value(4) {
                    self.order.item_mut().description = Some(description);
                }
            }
            "SE" => {
                self.transaction = None;
                self.in_ship_to = false;
                return Ok(self.order.finish(EdiStandard::X12, kind, &self.envelope));
            }
            _ => {}
        }
        Ok(None)
    }

    fn apply_contact(&mut self, segment: &Segment) {
        let header = self.order.header_mut();
        for (qualifier, value) in segment.qualified_pairs(2) {
            match qualifier {
                "TE" => header.recipient_phone = non_empty(value),
                "EM" => header.recipient_email = non_empty(value),
                _ => {}
            }
        }
    }
}

fn apply_product_pairs(item: &mut LineItem, segment: &Segment, start: usize) {
    for (qualifier, value) in segment.qualified_pairs(start) {
        match qualifier {
            "VP" | "BP" | "IN" | "SK" if item.product_id.is_none() => item.product_id = non_empty(value),
            "UP" | "UK" if item.upc.is_none() => item.upc = non_empty(value),
            _ => {}
        }
    }
}
