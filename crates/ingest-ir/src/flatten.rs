//! Record flattening into underscore-joined column names

use crate::tree::Node;
use crate::value::Value;

/// Nesting depth flattened before remaining structure is kept as JSON text.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Flatten one record into ordered `(column, value)` pairs.
///
/// Nested objects join their keys with `_` while the depth stays below
/// `max_depth`; deeper objects and every list are embedded as JSON strings.
/// A non-object record becomes a single `value` column.
pub fn flatten_record(record: &Node, max_depth: usize) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    match record {
        Node::Object(entries) => flatten_entries(entries, "", 0, max_depth, &mut out),
        Node::Array(_) => out.push(("value".to_string(), Value::Text(record.to_json().to_string()))),
        Node::Scalar(value) => out.push(("value".to_string(), value.clone())),
    }
    out
}

fn flatten_entries(
    entries: &[(String, Node)],
    prefix: &str,
    depth: usize,
    max_depth: usize,
    out: &mut Vec<(String, Value)>,
) {
    for (key, node) in entries {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}_{key}")
        };
        match node {
            Node::Object(children) if depth < max_depth => {
                flatten_entries(children, &name, depth + 1, max_depth, out);
            }
            Node::Object(_) | Node::Array(_) => {
                out.push((name, Value::Text(node.to_json().to_string())));
            }
            Node::Scalar(value) => out.push((name, value.clone())),
        }
    }
}
