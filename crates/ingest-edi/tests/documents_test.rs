//! Whole-document parsing for both standards.

use ingest_edi::{EdiStandard, Error, TransactionKind, parse_document};

const ISA: &str = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *240101*1200*U*00401*000000001*0*P*>~";

fn x12(body: &str) -> String {
    format!("{ISA}\nGS*PO*SENDER*RECEIVER*20240101*1200*1*X*004010~\n{body}GE*2*1~\nIEA*1*000000001~\n")
}

#[test]
fn test_two_x12_transactions_do_not_bleed() {
    let doc = x12(concat!(
        "ST*850*0001~\n",
        "BEG*00*SA*PO-1001**20240101~\n",
        "N1*ST*Alice Smith~\n",
        "N3*1 Main St~\n",
        "N4*Dallas*TX*75201*US~\n",
        "PO1*1*2*EA*10.00**VP*SKU-A~\n",
        "PID*F****Alpha~\n",
        "PO1*2*1*EA*5.25**VP*SKU-B*UP*012345678905~\n",
        "SE*9*0001~\n",
        "ST*850*0002~\n",
        "BEG*00*SA*PO-1002**20240102~\n",
        "PO1*1*7*EA*1.00**VP*SKU-C~\n",
        "SE*4*0002~\n",
    ));

    let parsed = parse_document(doc.as_bytes()).unwrap();
    assert_eq!(parsed.standard, EdiStandard::X12);
    assert_eq!(parsed.orders.len(), 2);

    let first = &parsed.orders[0];
    assert_eq!(first.header.po_number.as_deref(), Some("PO-1001"));
    assert_eq!(first.header.recipient_name.as_deref(), Some("Alice Smith"));
    assert_eq!(first.header.city.as_deref(), Some("Dallas"));
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].description.as_deref(), Some("Alpha"));
    assert_eq!(first.items[1].upc.as_deref(), Some("012345678905"));
    assert_eq!(first.envelope.sender_id.as_deref(), Some("SENDER"));

    let second = &parsed.orders[1];
    assert_eq!(second.header.po_number.as_deref(), Some("PO-1002"));
    assert!(second.header.recipient_name.is_none());
    assert!(second.header.city.is_none());
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].product_id.as_deref(), Some("SKU-C"));
    assert_eq!(second.items[0].quantity, 7);
}

#[test]
fn test_x12_ship_notice_and_invoice() {
    let doc = x12(concat!(
        "ST*856*0001~\n",
        "BSN*00*SHIP-9*20240101*1200~\n",
        "PRF*PO-55~\n",
        "LIN*1*VP*SKU-Z~\n",
        "SN1*1*3*EA~\n",
        "SE*6*0001~\n",
        "ST*810*0002~\n",
        "BIG*20240105*INV-3**PO-56~\n",
        "IT1*1*2*EA*4.50**VP*SKU-Y~\n",
        "SE*4*0002~\n",
    ));

    let parsed = parse_document(doc.as_bytes()).unwrap();
    assert_eq!(parsed.orders.len(), 2);

    let asn = &parsed.orders[0];
    assert_eq!(asn.transaction, TransactionKind::ShipNotice);
    assert_eq!(asn.header.reference_number.as_deref(), Some("SHIP-9"));
    assert_eq!(asn.header.po_number.as_deref(), Some("PO-55"));
    assert_eq!(asn.items[0].quantity, 3);
    assert_eq!(asn.items[0].product_id.as_deref(), Some("SKU-Z"));

    let invoice = &parsed.orders[1];
    assert_eq!(invoice.transaction_code(), "810");
    assert_eq!(invoice.header.reference_number.as_deref(), Some("INV-3"));
    assert_eq!(invoice.header.po_number.as_deref(), Some("PO-56"));
    assert_eq!(invoice.items[0].unit_price_cents, Some(450));
}

#[test]
fn test_unidentified_and_trailing_transactions_are_dropped() {
    let doc = x12(concat!(
        "ST*850*0001~\n",
        "PO1*1*2*EA*10.00**VP*SKU-A~\n",
        "SE*3*0001~\n",
        "ST*850*0002~\n",
        "BEG*00*SA*PO-TRAILING~\n",
    ));

    let parsed = parse_document(doc.as_bytes()).unwrap();
    assert!(parsed.orders.is_empty());
}

#[test]
fn test_unsupported_x12_subtype_fails_whole_document() {
    let doc = x12("ST*850*0001~\nBEG*00*SA*PO-1~\nSE*3*0001~\nST*997*0002~\nSE*2*0002~\n");
    let err = parse_document(doc.as_bytes()).unwrap_err();
    assert!(matches!(err, Error::UnsupportedTransaction { ref found, .. } if found == "997"));
}

#[test]
fn test_edifact_interchange_with_two_messages() {
    let doc = concat!(
        "UNA:+.? '\n",
        "UNB+UNOA:3+BUYER:14+SELLER:14+240101:1200+REF42'\n",
        "UNH+1+ORDERS:D:96A:UN'\n",
        "BGM+220+PO-2001+9'\n",
        "NAD+ST+++Bob?'s Shop+9 Oak Ave+Denver+CO+80202+US'\n",
        "LIN+1++SKU-1:SRV'\n",
        "QTY+21:6'\n",
        "UNT+6+1'\n",
        "UNH+2+ORDERS:D:96A:UN'\n",
        "BGM+220+PO-2002+9'\n",
        "LIN+1++SKU-9:SRV'\n",
        "UNT+4+2'\n",
        "UNZ+2+REF42'\n",
    );

    let parsed = parse_document(doc.as_bytes()).unwrap();
    assert_eq!(parsed.standard, EdiStandard::Edifact);
    assert_eq!(parsed.orders.len(), 2);

    let first = &parsed.orders[0];
    assert_eq!(first.header.recipient_name.as_deref(), Some("Bob's Shop"));
    assert_eq!(first.header.state.as_deref(), Some("CO"));
    assert_eq!(first.items[0].quantity, 6);
    assert_eq!(first.envelope.sender_id.as_deref(), Some("BUYER"));
    assert_eq!(first.envelope.control_number.as_deref(), Some("REF42"));

    let second = &parsed.orders[1];
    assert_eq!(second.header.po_number.as_deref(), Some("PO-2002"));
    assert!(second.header.recipient_name.is_none());
    assert_eq!(second.items[0].quantity, 1);
}

#[test]
fn test_edifact_without_message_header() {
    let err = parse_document(b"UNB+UNOA:3+A+B+240101:1200+1'UNZ+0+1'").unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
}
