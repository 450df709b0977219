//! Schema introspection and the process-wide snapshot cache.

use crate::adapters::DatabaseAdapter;
use crate::error::SchemaFetchError;
use crate::models::SchemaSnapshot;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Reads the working namespace's catalog through a [`DatabaseAdapter`].
#[derive(Clone)]
pub struct SchemaIntrospector {
    adapter: Arc<dyn DatabaseAdapter>,
    namespace: String,
}

impl std::fmt::Debug for SchemaIntrospector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaIntrospector")
            .field("engine", &self.adapter.engine_name())
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl SchemaIntrospector {
    pub fn new(adapter: Arc<dyn DatabaseAdapter>, namespace: impl Into<String>) -> Self {
        Self {
            adapter,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Reads base tables and ordered column metadata.
    ///
    /// # Errors
    /// Returns `SchemaFetchError` when the catalog is unreachable.
    pub async fn fetch(&self) -> Result<SchemaSnapshot, SchemaFetchError> {
        self.adapter.fetch_schema(&self.namespace).await
    }

    /// Like [`fetch`](Self::fetch) but degrades to an empty snapshot.
    ///
    /// The error, if any, is handed back so callers can report it while
    /// still building a prompt.
    pub async fn fetch_or_empty(&self) -> (SchemaSnapshot, Option<SchemaFetchError>) {
        match self.fetch().await {
            Ok(snapshot) => (snapshot, None),
            Err(e) => {
                tracing::warn!("{}; continuing with an empty schema", e);
                (SchemaSnapshot::empty(), Some(e))
            }
        }
    }
}

/// Process-scoped cache of the current [`SchemaSnapshot`].
///
/// The snapshot is fetched on first use and replaced wholesale by
/// [`refresh`](Self::refresh). Degraded (failed) fetches are handed to the
/// caller but never cached, so the next request retries the catalog.
#[derive(Debug)]
pub struct SchemaCache {
    introspector: SchemaIntrospector,
    current: RwLock<Option<Arc<SchemaSnapshot>>>,
}

impl SchemaCache {
    pub fn new(introspector: SchemaIntrospector) -> Self {
        Self {
            introspector,
            current: RwLock::new(None),
        }
    }

    pub fn introspector(&self) -> &SchemaIntrospector {
        &self.introspector
    }

    /// Returns the cached snapshot, fetching it on first use.
    ///
    /// The second element carries the fetch error when the returned
    /// snapshot is the degraded empty one.
    pub async fn get(&self) -> (Arc<SchemaSnapshot>, Option<SchemaFetchError>) {
        if let Some(snapshot) = self.current.read().await.as_ref() {
            return (Arc::clone(snapshot), None);
        }

        match self.introspector.fetch().await {
            Ok(snapshot) => {
                let mut current = self.current.write().await;
                // Another request may have filled the cache meanwhile
                let snapshot = current.get_or_insert_with(|| Arc::new(snapshot));
                (Arc::clone(snapshot), None)
            }
            Err(e) => {
                tracing::warn!("{}; continuing with an empty schema", e);
                (Arc::new(SchemaSnapshot::empty()), Some(e))
            }
        }
    }

    /// Rebuilds the snapshot from the catalog and swaps it in.
    ///
    /// # Errors
    /// Returns `SchemaFetchError` when the catalog is unreachable; the
    /// previously cached snapshot stays in place.
    pub async fn refresh(&self) -> Result<Arc<SchemaSnapshot>, SchemaFetchError> {
        let snapshot = Arc::new(self.introspector.fetch().await?);
        *self.current.write().await = Some(Arc::clone(&snapshot));
        tracing::info!(
            "Schema refreshed: {} tables, {} columns in '{}'",
            snapshot.table_count(),
            snapshot.column_count(),
            self.introspector.namespace()
        );
        Ok(snapshot)
    }

    /// The cached snapshot without triggering a fetch.
    pub async fn cached(&self) -> Option<Arc<SchemaSnapshot>> {
        self.current.read().await.clone()
    }
}
