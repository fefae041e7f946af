//! Normalized order model shared by both standards.

use std::fmt;

use ingest_ir::{ColumnType, SchemaColumn, Value};
use serde::Serialize;

/// EDI standard family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EdiStandard {
    #[serde(rename = "X12")]
    X12,
    #[serde(rename = "EDIFACT")]
    Edifact,
}

impl EdiStandard {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X12 => "X12",
            Self::Edifact => "EDIFACT",
        }
    }
}

impl fmt::Display for EdiStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported transaction families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    PurchaseOrder,
    ShipNotice,
    Invoice,
}

impl TransactionKind {
    const ALL: [TransactionKind; 3] = [Self::PurchaseOrder, Self::ShipNotice, Self::Invoice];

    /// Transaction set identifier used by `standard`.
    pub fn code(self, standard: EdiStandard) -> &'static str {
        match (standard, self) {
            (EdiStandard::X12, Self::PurchaseOrder) => "850",
            (EdiStandard::X12, Self::ShipNotice) => "856",
            (EdiStandard::X12, Self::Invoice) => "810",
            (EdiStandard::Edifact, Self::PurchaseOrder) => "ORDERS",
            (EdiStandard::Edifact, Self::ShipNotice) => "DESADV",
            (EdiStandard::Edifact, Self::Invoice) => "INVOIC",
        }
    }

    pub fn from_code(standard: EdiStandard, code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.code(standard).eq_ignore_ascii_case(code))
    }

    pub fn supported_codes(standard: EdiStandard) -> Vec<&'static str> {
        Self::ALL.iter().map(|kind| kind.code(standard)).collect()
    }
}

/// Interchange envelope details carried onto every order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub sender_id: Option<String>,
    pub receiver_id: Option<String>,
    pub control_number: Option<String>,
}

/// Header fields accumulated before the transaction trailer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderHeader {
    pub po_number: Option<String>,
    pub reference_number: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_company: Option<String>,
    pub recipient_phone: Option<String>,
    pub recipient_email: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl OrderHeader {
    /// Orders need a PO or reference number to be emitted.
    pub fn is_identified(&self) -> bool {
        self.po_number.is_some() || self.reference_number.is_some()
    }
}

/// One order line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItem {
    pub line_number: u32,
    pub product_id: Option<String>,
    pub description: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: Option<i64>,
    pub upc: Option<String>,
}

impl Default for LineItem {
    fn default() -> Self {
        Self {
            line_number: 0,
            product_id: None,
            description: None,
            quantity: 1,
            unit_price_cents: None,
            upc: None,
        }
    }
}

impl LineItem {
    pub fn with_line_number(mut self, line_number: Option<u32>) -> Self {
        self.line_number = line_number.unwrap_or(0);
        self
    }
}

/// An order extracted from one transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedOrder {
    #[serde(flatten)]
    pub header: OrderHeader,
    pub items: Vec<LineItem>,
    pub standard: EdiStandard,
    pub transaction: TransactionKind,
    pub envelope: Envelope,
}

/// Column names of the tabular form, in load order.
pub const ORDER_COLUMNS: [&str; 18] = [
    "po_number",
    "reference_number",
    "recipient_name",
    "recipient_company",
    "recipient_phone",
    "recipient_email",
    "address_line1",
    "address_line2",
    "city",
    "state",
    "postal_code",
    "country",
    "items",
    "edi_format",
    "edi_transaction_type",
    "sender_id",
    "receiver_id",
    "interchange_control_number",
];

impl NormalizedOrder {
    pub fn transaction_code(&self) -> &'static str {
        self.transaction.code(self.standard)
    }

    /// Schema of the tabular form; every column is text.
    pub fn schema() -> Vec<SchemaColumn> {
        ORDER_COLUMNS
            .iter()
            .map(|name| SchemaColumn::new(*name, ColumnType::Text))
            .collect()
    }

    /// Values aligned with [`ORDER_COLUMNS`].
    pub fn to_values(&self) -> Vec<Value> {
        let h = &self.header;
        let text = |field: &Option<String>| field.clone().map_or(Value::Null, Value::Text);
        let items = serde_json::to_string(&self.items).unwrap_or_else(|_| "[]".to_string());

        vec![
            text(&h.po_number),
            text(&h.reference_number),
            text(&h.recipient_name),
            text(&h.recipient_company),
            text(&h.recipient_phone),
            text(&h.recipient_email),
            text(&h.address_line1),
            text(&h.address_line2),
            text(&h.city),
            text(&h.state),
            text(&h.postal_code),
            Value::Text(h.country.clone().unwrap_or_else(|| "US".to_string())),
            Value::Text(items),
            Value::Text(self.standard.as_str().to_string()),
            Value::Text(self.transaction_code().to_string()),
            text(&self.envelope.sender_id),
            text(&self.envelope.receiver_id),
            text(&self.envelope.control_number),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_codes_round_trip() {
        assert_eq!(
            TransactionKind::from_code(EdiStandard::X12, "856"),
            Some(TransactionKind::ShipNotice)
        );
        assert_eq!(
            TransactionKind::from_code(EdiStandard::Edifact, "invoic"),
            Some(TransactionKind::Invoice)
        );
        assert_eq!(TransactionKind::from_code(EdiStandard::X12, "ORDERS"), None);
        assert_eq!(
            TransactionKind::supported_codes(EdiStandard::X12),
            vec!["850", "856", "810"]
        );
    }

    #[test]
    fn test_values_align_with_columns_and_default_country() {
        let order = NormalizedOrder {
            header: OrderHeader {
                po_number: Some("PO-1".into()),
                ..OrderHeader::default()
            },
            items: vec![LineItem::default().with_line_number(Some(1))],
            standard: EdiStandard::X12,
            transaction: TransactionKind::PurchaseOrder,
            envelope: Envelope::default(),
        };
        let values = order.to_values();
        assert_eq!(values.len(), ORDER_COLUMNS.len());
        assert_eq!(values[0], Value::from("PO-1"));
        assert_eq!(values[11], Value::from("US"));
        assert_eq!(values[14], Value::from("850"));
        let items: serde_json::Value = serde_json::from_str(values[12].as_text().unwrap()).unwrap();
        assert_eq!(items[0]["quantity"], 1);
    }
}
