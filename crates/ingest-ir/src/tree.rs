//! Tagged record tree for hierarchical documents.
//!
//! JSON and XML payloads are converted into [`Node`] before record discovery
//! and flattening, so both formats share one walk.

use serde_json::{Map, Value as JsonValue};

use crate::value::Value;
use crate::{Error, Result};

/// A node in a hierarchical document
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Keyed children in document order.
    Object(Vec<(String, Node)>),
    Array(Vec<Node>),
    Scalar(Value),
}

impl Node {
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(map) => Node::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Node::from_json(value)))
                    .collect(),
            ),
            JsonValue::Array(items) => Node::Array(items.into_iter().map(Node::from_json).collect()),
            scalar => Node::Scalar(Value::from_json(&scalar)),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Node::Object(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key.clone(), value.to_json());
                }
                JsonValue::Object(map)
            }
            Node::Array(items) => JsonValue::Array(items.iter().map(Node::to_json).collect()),
            Node::Scalar(value) => value.to_json(),
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Node::Object(_))
    }

    /// Child of an object node by key.
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Follow a slash-separated path. Numeric segments index arrays.
    pub fn resolve_path(&self, path: &str) -> Result<&Node> {
        let segments: Vec<&str> = path
            .split('/')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect();
        if segments.is_empty() {
            return Err(Error::invalid_path(path, "path has no segments"));
        }

        let mut current = self;
        for segment in segments {
            current = match current {
                Node::Object(_) => current
                    .get(segment)
                    .ok_or_else(|| Error::path_not_found(path, format!("no key '{segment}'")))?,
                Node::Array(items) => {
                    let index: usize = segment.parse().map_err(|_| {
                        Error::invalid_path(path, format!("'{segment}' is not an array index"))
                    })?;
                    items.get(index).ok_or_else(|| {
                        Error::path_not_found(path, format!("index {index} out of range"))
                    })?
                }
                Node::Scalar(_) => {
                    return Err(Error::path_not_found(
                        path,
                        format!("cannot descend into a scalar at '{segment}'"),
                    ));
                }
            };
        }
        Ok(current)
    }

    /// The first key, in document order, whose value is a non-empty list of objects.
    pub fn first_object_list_key(&self) -> Option<(&str, &[Node])> {
        let Node::Object(entries) = self else {
            return None;
        };
        entries.iter().find_map(|(key, value)| match value {
            Node::Array(items) if !items.is_empty() && items.iter().all(Node::is_object) => {
                Some((key.as_str(), items.as_slice()))
            }
            _ => None,
        })
    }

    /// The largest list of objects anywhere in the tree. Ties keep the first found.
    pub fn largest_object_list(&self) -> Option<(String, &[Node])> {
        let mut best: Option<(String, &[Node])> = None;
        visit_lists(self, "", &mut best);
        best
    }

    /// Turn a discovered collection into individual records.
    pub fn into_records(self) -> Vec<Node> {
        match self {
            Node::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Node::Object(_) => item,
                    other => Node::Object(vec![("value".to_string(), other)]),
                })
                .collect(),
            Node::Object(_) => vec![self],
            Node::Scalar(_) => vec![Node::Object(vec![("value".to_string(), self)])],
        }
    }
}

fn visit_lists<'a>(node: &'a Node, path: &str, best: &mut Option<(String, &'a [Node])>) {
    match node {
        Node::Array(items) => {
            let candidate = !items.is_empty()
                && items.iter().all(Node::is_object)
                && best.as_ref().is_none_or(|(_, current)| items.len() > current.len());
            if candidate {
                *best = Some((path.to_string(), items.as_slice()));
            }
            for (index, item) in items.iter().enumerate() {
                visit_lists(item, &join_path(path, &index.to_string()), best);
            }
        }
        Node::Object(entries) => {
            for (key, value) in entries {
                visit_lists(value, &join_path(path, key), best);
            }
        }
        Node::Scalar(_) => {}
    }
}

fn join_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{parent}/{segment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_path_through_objects_and_arrays() {
        let tree = Node::from_json(json!({"data": {"orders": [{"id": 1}, {"id": 2}]}}));
        let orders = tree.resolve_path("data/orders").unwrap();
        assert!(matches!(orders, Node::Array(items) if items.len() == 2));

        let second = tree.resolve_path("data/orders/1/id").unwrap();
        assert_eq!(second, &Node::Scalar(Value::Integer(2)));

        assert!(matches!(
            tree.resolve_path("data/missing"),
            Err(Error::PathNotFound { .. })
        ));
        assert!(matches!(
            tree.resolve_path("data/orders/x"),
            Err(Error::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_first_object_list_key_respects_document_order() {
        let tree = Node::from_json(json!({
            "meta": {"count": 2},
            "tags": ["a", "b"],
            "shipments": [{"id": 1}],
            "orders": [{"id": 1}, {"id": 2}]
        }));
        let (key, items) = tree.first_object_list_key().unwrap();
        assert_eq!(key, "shipments");
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_largest_object_list_searches_whole_tree() {
        let tree = Node::from_json(json!({
            "Envelope": {
                "Header": [{"a": 1}],
                "Body": {"Order": [{"id": 1}, {"id": 2}, {"id": 3}]}
            }
        }));
        let (path, items) = tree.largest_object_list().unwrap();
        assert_eq!(path, "Envelope/Body/Order");
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_into_records_wraps_scalars() {
        let records = Node::from_json(json!([{"a": 1}, 5])).into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1].get("value"),
            Some(&Node::Scalar(Value::Integer(5)))
        );
    }
}
