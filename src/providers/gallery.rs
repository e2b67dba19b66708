//! Gallery search: the primary catalog provider
//!
//! Queries may carry `type:<kind>` filters (`type:geosource`, `type:map`,
//! `type:gallery`). When the catalog has nothing to show, the provider falls
//! back to query completions, then to related terms.

use super::traits::{ProviderError, SearchSource};
use crate::config::DEFAULT_PRIMARY_PROVIDER;
use crate::search::Query;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of catalog resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    GeoSource,
    Map,
    Gallery,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [Self::GeoSource, Self::Map, Self::Gallery];

    /// Keyword used in `type:` filters
    pub fn keyword(self) -> &'static str {
        match self {
            Self::GeoSource => "geosource",
            Self::Map => "map",
            Self::Gallery => "gallery",
        }
    }
}

/// Publication state of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Active,
    Archived,
    Removed,
}

/// A catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub kind: ResourceType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub state: ResourceState,
    /// Number of resources in a gallery
    #[serde(default)]
    pub members: usize,
    pub updated: DateTime<Utc>,
}

impl Resource {
    /// Whether the resource is worth showing to a user
    fn is_listable(&self) -> bool {
        match self.kind {
            ResourceType::Gallery => self.members > 0,
            ResourceType::GeoSource | ResourceType::Map => self.state == ResourceState::Active,
        }
    }
}

/// One entry of a gallery answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GalleryHit {
    Resource(Resource),
    /// A query the user may want to run instead
    Suggestion { text: String },
}

/// Remote catalog the gallery provider talks to
#[async_trait]
pub trait GalleryBackend: Send + Sync + 'static {
    /// Resources of the given kinds matching `text`, newest first
    async fn resources(&self, types: &[ResourceType], text: &str) -> anyhow::Result<Vec<Resource>>;

    /// Completions of a partial query
    async fn suggest_completions(&self, text: &str) -> anyhow::Result<Vec<String>>;

    /// Terms related to a query
    async fn suggest_terms(&self, text: &str) -> anyhow::Result<Vec<String>>;
}

/// Split `type:<kind>` filters out of a query.
///
/// Returns the requested kinds (all of them when no filter is present) and
/// the remaining text.
pub fn parse_type_filters(text: &str) -> (Vec<ResourceType>, String) {
    let mut types = Vec::new();
    let mut rest = Vec::new();

    for token in text.split_whitespace() {
        let kind = token
            .to_lowercase()
            .strip_prefix("type:")
            .and_then(|kw| ResourceType::ALL.into_iter().find(|t| t.keyword() == kw));

        match kind {
            Some(kind) if !types.contains(&kind) => types.push(kind),
            Some(_) => {}
            None => rest.push(token),
        }
    }

    if types.is_empty() {
        types = ResourceType::ALL.to_vec();
    }
    (types, rest.join(" "))
}

/// Catalog search provider
pub struct GallerySearch<B> {
    name: String,
    backend: B,
    result_limit: Option<usize>,
}

impl<B: GalleryBackend> GallerySearch<B> {
    /// Create a gallery search registered under the default primary name
    pub fn new(backend: B) -> Self {
        Self {
            name: DEFAULT_PRIMARY_PROVIDER.to_string(),
            backend,
            result_limit: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_result_limit(mut self, limit: usize) -> Self {
        self.result_limit = Some(limit);
        self
    }
}

fn suggestions(texts: Vec<String>) -> Vec<GalleryHit> {
    texts
        .into_iter()
        .map(|text| GalleryHit::Suggestion { text })
        .collect()
}

#[async_trait]
impl<B: GalleryBackend> SearchSource for GallerySearch<B> {
    type Output = Vec<GalleryHit>;

    fn name(&self) -> &str {
        &self.name
    }

    fn result_limit(&self) -> Option<usize> {
        self.result_limit
    }

    async fn search(&self, query: &Query) -> Result<Vec<GalleryHit>, ProviderError> {
        let (types, text) = parse_type_filters(query.text());

        let resources: Vec<GalleryHit> = self
            .backend
            .resources(&types, &text)
            .await?
            .into_iter()
            .filter(Resource::is_listable)
            .map(GalleryHit::Resource)
            .collect();
        if !resources.is_empty() {
            return Ok(resources);
        }

        let completions = self.backend.suggest_completions(text.trim()).await?;
        if !completions.is_empty() {
            return Ok(suggestions(completions));
        }

        let terms = self.backend.suggest_terms(text.trim()).await?;
        Ok(suggestions(terms))
    }
}

/// Catalog held in memory, for demos and tests
#[derive(Debug, Clone, Default)]
pub struct InMemoryGallery {
    resources: Vec<Resource>,
    vocabulary: Vec<String>,
}

impl InMemoryGallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    /// Add words offered as completions and related terms
    pub fn with_vocabulary<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vocabulary.extend(words.into_iter().map(Into::into));
        self
    }
}

const MAX_SUGGESTIONS: usize = 5;

#[async_trait]
impl GalleryBackend for InMemoryGallery {
    async fn resources(&self, types: &[ResourceType], text: &str) -> anyhow::Result<Vec<Resource>> {
        let needle = text.trim().to_lowercase();
        let mut found: Vec<Resource> = self
            .resources
            .iter()
            .filter(|r| types.contains(&r.kind))
            .filter(|r| {
                needle.is_empty()
                    || r.name.to_lowercase().contains(&needle)
                    || r.description.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated.cmp(&a.updated));
        Ok(found)
    }

    async fn suggest_completions(&self, text: &str) -> anyhow::Result<Vec<String>> {
        let prefix = text.to_lowercase();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .vocabulary
            .iter()
            .filter(|word| {
                let word = word.to_lowercase();
                word.starts_with(&prefix) && word != prefix
            })
            .take(MAX_SUGGESTIONS)
            .cloned()
            .collect())
    }

    async fn suggest_terms(&self, text: &str) -> anyhow::Result<Vec<String>> {
        let stems: Vec<String> = text
            .split_whitespace()
            .map(|word| word.to_lowercase().chars().take(3).collect::<String>())
            .filter(|stem| stem.chars().count() == 3)
            .collect();

        Ok(self
            .vocabulary
            .iter()
            .filter(|word| {
                let word = word.to_lowercase();
                stems.iter().any(|stem| word.starts_with(stem.as_str()))
            })
            .take(MAX_SUGGESTIONS)
            .cloned()
            .collect())
    }
}
