//! EDIFACT message state machine (ORDERS, DESADV, INVOIC).

use tracing::trace;

use crate::accumulator::{OrderAccumulator, parse_cents, parse_line_number, parse_quantity};
use crate::model::{EdiStandard, Envelope, LineItem, NormalizedOrder, TransactionKind};
use crate::segment::{Segment, SegmentParser, non_empty};
use crate::{Error, Result};

/// Parse every message of an EDIFACT interchange.
pub fn parse(data: &[u8]) -> Result<Vec<NormalizedOrder>> {
    let segments = SegmentParser::new(data).collect::<Result<Vec<_>>>()?;
    if !segments.iter().any(|segment| segment.tag == "UNH") {
        return Err(Error::Parse {
            line: 1,
            column: 1,
            message: "no UNH message header found".to_string(),
        });
    }

    let mut machine = EdifactMachine::default();
    let mut orders = Vec::new();
    for segment in &segments {
        if let Some(order) = machine.step(segment)? {
            orders.push(order);
        }
    }
    Ok(orders)
}

/// Segment-by-segment EDIFACT parser state
#[derive(Debug, Clone, Default)]
pub struct EdifactMachine {
    envelope: Envelope,
    message: Option<TransactionKind>,
    in_ship_to: bool,
    order: OrderAccumulator,
}

impl EdifactMachine {
    pub fn accumulator(&self) -> &OrderAccumulator {
        &self.order
    }

    /// Apply one segment; returns an order when a message closes.
    pub fn step(&mut self, segment: &Segment) -> Result<Option<NormalizedOrder>> {
        trace!(tag = %segment.tag, "EDIFACT segment");
        match segment.tag.as_str() {
            "UNB" => {
                self.envelope = Envelope {
                    sender_id: segment.component_value(1, 0),
                    receiver_id: segment.component_value(2, 0),
                    control_number: segment.value(4),
                };
                return Ok(None);
            }
            "UNH" => {
                let code = segment.component(1, 0);
                let kind = TransactionKind::from_code(EdiStandard::Edifact, code)
                    .ok_or_else(|| Error::unsupported(EdiStandard::Edifact, code))?;
                self.message = Some(kind);
                self.in_ship_to = false;
                self.order = OrderAccumulator::default();
                return Ok(None);
            }
            _ => {}
        }

        let Some(kind) = self.message else {
            return Ok(None);
        };

        match segment.tag.as_str() {
            "BGM" => {
                let number = segment.component_value(1, 0);
                let header = self.order.header_mut();
                if kind == TransactionKind::PurchaseOrder {
                    header.po_number = number;
                } else {
                    header.reference_number = number;
                }
            }
            "RFF" if segment.component(0, 0) == "ON" => {
                self.order.header_mut().po_number = segment.component_value(0, 1);
            }
            "NAD" => {
                self.in_ship_to = segment.element(0) == "ST";
                if self.in_ship_to {
                    let header = self.order.header_mut();
                    header.recipient_name = segment.joined(3);
                    header.address_line1 = segment.component_value(4, 0);
                    header.address_line2 = segment.component_value(4, 1);
                    header.city = segment.value(5);
                    header.state = segment.value(6);
                    header.postal_code = segment.value(7);
                    header.country = segment.value(8);
                }
            }
            "COM" if self.in_ship_to => {
                let number = non_empty(segment.component(0, 0));
                let header = self.order.header_mut();
                match segment.component(0, 1) {
                    "TE" => header.recipient_phone = number,
                    "EM" => header.recipient_email = number,
                    _ => {}
                }
            }
            "LIN" => {
                self.in_ship_to = false;
                let item = LineItem {
                    product_id: segment.component_value(2, 0),
                    ..LineItem::default()
                }
                .with_line_number(parse_line_number(segment.element(0)));
                self.order.start_item(item);
            }
            "PIA" => {
                let item = self.order.item_mut();
                if item.product_id.is_none() {
                    item.product_id = segment.component_value(1, 0);
                }
            }
            "IMD" => {
                if let Some(description) = segment.component_value(2, 3) {
                    self.order.item_mut().description = Some(description);
                }
            }
            "QTY" => self.order.item_mut().quantity = parse_quantity(segment.component(0, 1)),
            "PRI" => self.order.item_mut().unit_price_cents = parse_cents(segment.component(0, 1)),
            "UNT" => {
                self.message = None;
                self.in_ship_to = false;
                return Ok(self.order.finish(EdiStandard::Edifact, kind, &self.envelope));
            }
            _ => {}
        }
        Ok(None)
    }
}
