//! The adapter seam and the registry that routes a format tag to its adapter.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ingest_ir::{ImportResult, SchemaColumn, SourceType};
use ingest_store::TabularStore;
use serde::Serialize;
use tracing::debug;

use crate::request::ImportRequest;
use crate::{
    DatabaseAdapter, DelimitedAdapter, EdiAdapter, Error, FixedWidthAdapter, JsonAdapter, Result,
    SpreadsheetAdapter, XmlAdapter,
};

/// Summary of whatever the store currently holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceMetadata {
    pub source_type: SourceType,
    pub row_count: u64,
    pub column_count: usize,
    pub columns: Vec<SchemaColumn>,
}

/// Reads one source format into the tabular store.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// Read, type and load the source, replacing the store's active import.
    async fn import(&self, store: &TabularStore, request: &ImportRequest) -> Result<ImportResult>;

    async fn describe_current(&self, store: &TabularStore) -> Result<SourceMetadata> {
        let columns = store.columns().await?;
        Ok(SourceMetadata {
            source_type: self.source_type(),
            row_count: store.row_count().await?,
            column_count: columns.len(),
            columns,
        })
    }
}

/// Adapters keyed by format tag.
pub struct AdapterRegistry {
    adapters: DashMap<SourceType, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            adapters: DashMap::new(),
        }
    }

    /// A registry holding the seven built-in adapters.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        let adapters: [Arc<dyn SourceAdapter>; 7] = [
            Arc::new(DelimitedAdapter),
            Arc::new(SpreadsheetAdapter),
            Arc::new(FixedWidthAdapter),
            Arc::new(JsonAdapter),
            Arc::new(XmlAdapter),
            Arc::new(DatabaseAdapter),
            Arc::new(EdiAdapter),
        ];
        for adapter in adapters {
            registry.register(adapter);
        }
        registry
    }

    /// Register an adapter, returning the one it replaced.
    pub fn register(&self, adapter: Arc<dyn SourceAdapter>) -> Option<Arc<dyn SourceAdapter>> {
        let source_type = adapter.source_type();
        debug!(source_type = %source_type, "Registering adapter");
        self.adapters.insert(source_type, adapter)
    }

    pub fn get(&self, source_type: SourceType) -> Result<Arc<dyn SourceAdapter>> {
        self.adapters
            .get(&source_type)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::Unregistered(source_type))
    }

    pub fn contains(&self, source_type: SourceType) -> bool {
        self.adapters.contains_key(&source_type)
    }

    /// Registered tags in canonical order.
    pub fn source_types(&self) -> Vec<SourceType> {
        SourceType::ALL
            .into_iter()
            .filter(|source_type| self.contains(*source_type))
            .collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("source_types", &self.source_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub;

    #[async_trait]
    impl SourceAdapter for Stub {
        fn source_type(&self) -> SourceType {
            SourceType::Json
        }

        async fn import(&self, _store: &TabularStore, _request: &ImportRequest) -> Result<ImportResult> {
            Ok(ImportResult::new(SourceType::Json, 0, Vec::new()))
        }
    }

    #[test]
    fn test_defaults_cover_every_format() {
        let registry = AdapterRegistry::with_defaults();
        assert_eq!(registry.source_types(), SourceType::ALL.to_vec());
        for source_type in SourceType::ALL {
            assert_eq!(registry.get(source_type).unwrap().source_type(), source_type);
        }
    }

    #[test]
    fn test_register_replaces_and_missing_is_rejected() {
        let registry = AdapterRegistry::new();
        assert!(matches!(
            registry.get(SourceType::Json),
            Err(Error::Unregistered(SourceType::Json))
        ));
        assert!(registry.register(Arc::new(Stub)).is_none());
        assert!(registry.register(Arc::new(Stub)).is_some());
        assert_eq!(registry.source_types(), vec![SourceType::Json]);
    }
}
