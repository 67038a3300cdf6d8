//! Filesystem-backed mock resolver.
//!
//! Resolves fixture references as JSON files relative to a root
//! directory and producer references against a registry populated with
//! [`FsMockResolver::with_producer`]. Suits layers whose fixtures live
//! next to the test suite on disk.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::mock::{ApiDescriptor, MockPayload, MockProducer, MockRef, MockResolver};
use crate::result::LoaderError;

/// Resolver backed by a fixture directory and a producer registry.
pub struct FsMockResolver {
    root: PathBuf,
    producers: HashMap<String, MockProducer>,
}

impl FsMockResolver {
    /// Resolver rooted at `root`; fixture references are joined onto it.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            producers: HashMap::new(),
        }
    }

    /// Register `producer` under `name`, replacing a previous entry.
    ///
    /// The producer receives the call's encoded arguments and returns
    /// the encoded result, letting one fixture answer many argument
    /// shapes.
    #[must_use]
    pub fn with_producer<F, Fut>(mut self, name: impl Into<String>, producer: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, LoaderError>> + Send + 'static,
    {
        let wrapped: MockProducer = Arc::new(move |value| {
            let produced: BoxFuture<'static, Result<serde_json::Value, LoaderError>> =
                Box::pin(producer(value));
            produced
        });
        self.producers.insert(name.into(), wrapped);
        self
    }

    /// Root directory fixture references resolve against.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn load_fixture(&self, relative: &str) -> Result<MockPayload, LoaderError> {
        let path = self.root.join(relative);
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            return Err(LoaderError::UnsupportedFormat {
                path: path.display().to_string(),
            });
        }
        let text = tokio::fs::read_to_string(&path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                LoaderError::NotFound {
                    path: path.display().to_string(),
                }
            } else {
                LoaderError::Io(err)
            }
        })?;
        let value = serde_json::from_str(&text).map_err(|source| LoaderError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "fixture loaded");
        Ok(MockPayload::Value(value))
    }
}

#[async_trait]
impl MockResolver for FsMockResolver {
    async fn resolve(&self, descriptor: &ApiDescriptor) -> Result<MockPayload, LoaderError> {
        match &descriptor.mock_ref {
            MockRef::Fixture(relative) => self.load_fixture(relative).await,
            MockRef::Producer(name) => self
                .producers
                .get(name)
                .cloned()
                .map(MockPayload::Producer)
                .ok_or_else(|| LoaderError::NotFound {
                    path: format!("producer:{name}"),
                }),
        }
    }
}

impl fmt::Debug for FsMockResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut producers: Vec<&str> = self.producers.keys().map(String::as_str).collect();
        producers.sort_unstable();
        f.debug_struct("FsMockResolver")
            .field("root", &self.root)
            .field("producers", &producers)
            .finish()
    }
}
