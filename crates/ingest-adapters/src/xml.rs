//! XML documents, converted into the shared record tree.
//!
//! Conversion rules:
//! - element and attribute names lose their namespace prefixes
//! - repeated sibling elements become an array
//! - an element with only text collapses to that text
//! - text next to attributes or child elements is kept under `text`
//! - an empty element is null
//! - every scalar stays text

use async_trait::async_trait;
use ingest_ir::{ImportResult, Node, SourceType, Value};
use ingest_store::TabularStore;
use tracing::debug;

use crate::adapter::SourceAdapter;
use crate::delimited::decode_text;
use crate::json::records_table;
use crate::request::ImportRequest;
use crate::{Error, Result};

/// Key for text found next to attributes or child elements.
const MIXED_TEXT_KEY: &str = "text";

/// Parse a document into a tree keyed by the root element's name.
pub fn parse_tree(text: &str) -> Result<Node> {
    let document = roxmltree::Document::parse(text)?;
    let root = document.root_element();
    Ok(Node::Object(vec![(
        root.tag_name().name().to_string(),
        element_node(root),
    )]))
}

fn element_node(element: roxmltree::Node<'_, '_>) -> Node {
    let mut entries: Vec<(String, Node)> = element
        .attributes()
        .map(|attribute| {
            (
                attribute.name().to_string(),
                Node::Scalar(Value::Text(attribute.value().to_string())),
            )
        })
        .collect();

    let mut text = String::new();
    let mut has_children = false;
    for child in element.children() {
        if child.is_element() {
            has_children = true;
            push_child(&mut entries, child.tag_name().name(), element_node(child));
        } else if child.is_text() {
            text.push_str(child.text().unwrap_or_default());
        }
    }

    let text = text.trim();
    if entries.is_empty() {
        return match text {
            "" => Node::Scalar(Value::Null),
            text => Node::Scalar(Value::Text(text.to_string())),
        };
    }
    if !text.is_empty() {
        entries.push((MIXED_TEXT_KEY.to_string(), Node::Scalar(Value::Text(text.to_string()))));
    }
    Node::Object(entries)
}

fn push_child(entries: &mut Vec<(String, Node)>, name: &str, node: Node) {
    match entries.iter_mut().find(|(key, _)| key == name) {
        Some((_, Node::Array(items))) => items.push(node),
        Some((_, existing)) => {
            let first = std::mem::replace(existing, Node::Array(Vec::new()));
            *existing = Node::Array(vec![first, node]);
        }
        None => entries.push((name.to_string(), node)),
    }
}

/// Records plus the warning raised when they were auto-discovered.
pub fn discover_records(tree: Node, record_path: Option<&str>) -> Result<(Vec<Node>, Option<String>)> {
    if let Some(path) = record_path.filter(|path| !path.trim().is_empty()) {
        let found = tree.resolve_path(path)?.clone();
        if matches!(found, Node::Scalar(_)) {
            return Err(Error::format(
                SourceType::Xml,
                format!("record path '{path}' points to a text value"),
            ));
        }
        return Ok((found.into_records(), None));
    }

    if let Some((path, items)) = tree.largest_object_list() {
        let element = path.rsplit('/').next().unwrap_or(&path).to_string();
        debug!(path = %path, records = items.len(), "Auto-discovered XML records");
        let warning = format!(
            "XML records were auto-discovered from repeating element '{element}' at '{path}'; \
             pass a record path if the wrong element was selected"
        );
        return Ok((items.to_vec(), Some(warning)));
    }

    let content = match tree {
        Node::Object(mut entries) if entries.len() == 1 => entries.remove(0).1,
        other => other,
    };
    Ok((content.into_records(), None))
}

/// XML adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlAdapter;

#[async_trait]
impl SourceAdapter for XmlAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Xml
    }

    async fn import(&self, store: &TabularStore, request: &ImportRequest) -> Result<ImportResult> {
        let bytes = request
            .read_bytes(Some(request.limits.max_document_bytes))
            .await?;
        let tree = parse_tree(&decode_text(&bytes))?;
        let (records, warning) = discover_records(tree, request.options.record_path.as_deref())?;

        let mut table = records_table(&records, request.limits.flatten_max_depth);
        if let Some(warning) = warning {
            table = table.with_warning(warning);
        }
        table.load(store, SourceType::Xml).await
    }
}
