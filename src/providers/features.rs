//! Feature search over a single data source

use super::traits::{ProviderError, SearchSource};
use crate::search::{Geometry, Query};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Page size requested from the backend
pub const FEATURE_PAGE_SIZE: usize = 50;

/// Request sent to a [`FeatureBackend`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRequest {
    pub text: String,
    pub geometry: Option<Geometry>,
    /// Fields to match against; empty means all
    pub fields: Vec<String>,
    pub skip: usize,
    pub take: usize,
}

/// One page of matching features (GeoJSON objects)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaturePage {
    pub features: Vec<serde_json::Value>,
    #[serde(default)]
    pub total: Option<usize>,
}

/// Data source able to search its features
#[async_trait]
pub trait FeatureBackend: Send + Sync + 'static {
    async fn search_features(&self, request: FeatureRequest) -> anyhow::Result<FeaturePage>;
}

/// Provider answering with the first page of matching features
pub struct FeatureSearch<B> {
    name: String,
    fields: Vec<String>,
    backend: B,
}

impl<B: FeatureBackend> FeatureSearch<B> {
    /// Search `backend`, registered under the data source's name
    pub fn new(name: impl Into<String>, backend: B) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            backend,
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl<B: FeatureBackend> SearchSource for FeatureSearch<B> {
    type Output = Vec<serde_json::Value>;

    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &Query) -> Result<Vec<serde_json::Value>, ProviderError> {
        let request = FeatureRequest {
            text: query.text().to_string(),
            geometry: query.geometry().cloned(),
            fields: self.fields.clone(),
            skip: 0,
            take: FEATURE_PAGE_SIZE,
        };
        let page = self
            .backend
            .search_features(request)
            .await
            .map_err(|e| ProviderError::Unavailable(format!("{}: {:#}", self.name, e)))?;
        Ok(page.features)
    }
}
