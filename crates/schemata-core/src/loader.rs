//! Fetching schema documents that compilation found missing.
//!
//! [`Engine::compile_async`](crate::Engine::compile_async) asks a [`Loader`]
//! for each document a `$ref` names but the engine does not hold. Fetches
//! go through [`Fetches`], which keeps one in-flight request per URI: every
//! caller asking for the same document while it loads shares the outcome.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::error::LoadError;

/// Source of schema documents by URI.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<Value, LoadError>;
}

type Outcome = Result<Arc<Value>, Arc<LoadError>>;

/// De-duplicates concurrent fetches of the same URI.
#[derive(Default)]
pub struct Fetches {
    pending: Mutex<HashMap<String, Arc<OnceCell<Outcome>>>>,
}

impl Fetches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch `uri`, joining a fetch already in flight for it.
    pub async fn fetch(&self, loader: &dyn Loader, uri: &str) -> Outcome {
        let cell = {
            let mut pending = self.pending.lock().await;
            pending.entry(uri.to_string()).or_default().clone()
        };
        let outcome = cell
            .get_or_init(|| async {
                info!(uri, "loading schema");
                loader.fetch(uri).await.map(Arc::new).map_err(Arc::new)
            })
            .await
            .clone();

        // settled: the next request for this URI starts a new fetch
        let mut pending = self.pending.lock().await;
        if pending.get(uri).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
            pending.remove(uri);
        }
        outcome
    }

    /// Number of fetches in flight.
    pub async fn in_flight(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Serves `<dir>/<name>.json` for any URI whose last path segment is
/// `<name>` or `<name>.json`.
#[derive(Debug, Clone)]
pub struct DirLoader {
    root: PathBuf,
}

impl DirLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, uri: &str) -> Option<PathBuf> {
        let without_fragment = uri.split('#').next().unwrap_or(uri);
        let name = without_fragment
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")?;
        let file = if name.ends_with(".json") {
            name.to_string()
        } else {
            format!("{name}.json")
        };
        Some(self.root.join(file))
    }
}

#[async_trait]
impl Loader for DirLoader {
    async fn fetch(&self, uri: &str) -> Result<Value, LoadError> {
        let path = self.path_for(uri).ok_or_else(|| LoadError::NotFound(uri.to_string()))?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoadError::NotFound(uri.to_string()));
            }
            Err(source) => {
                return Err(LoadError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        debug!(uri, path = %path.display(), bytes = text.len(), "read schema file");
        serde_json::from_str(&text).map_err(|source| LoadError::Parse {
            uri: uri.to_string(),
            source,
        })
    }
}
