//! In-document property and expression search
//!
//! Looks up fields of the items in the open map by name, and turns
//! `=`-prefixed calculator expressions such as `=[population]/[area]`
//! into their variable form (`=a0/b2`).

use super::traits::{ProviderError, SearchSource};
use crate::search::Query;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

/// Matches `[field name]` references in an expression
static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(.*?)\]").expect("reference pattern is valid"));

/// Shortest query that triggers a property lookup
pub const MIN_QUERY_LENGTH: usize = 2;

/// A field exposed by a map item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
        }
    }
}

/// A layer in the map. Items without fields are not searchable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapGroup {
    pub name: String,
    pub items: Vec<MapItem>,
}

/// The document being searched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapModel {
    pub groups: Vec<MapGroup>,
}

/// A field that matched a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyMatch {
    pub item_id: String,
    pub item_name: String,
    pub field: Field,
    pub field_index: usize,
}

/// One entry of a property search answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyHit {
    Property(PropertyMatch),
    Expression {
        /// The query as typed
        text: String,
        /// Expression with references replaced by variables
        expression: String,
        /// Each `[reference]` and the field it resolved to
        references: Vec<(String, PropertyMatch)>,
        /// Ids of the items the variables point at, by letter
        items: Vec<String>,
    },
}

/// Which lookups to perform
#[derive(Debug, Clone, Copy)]
pub struct PropertySearchOptions {
    pub find_properties: bool,
    pub find_expressions: bool,
}

impl Default for PropertySearchOptions {
    fn default() -> Self {
        Self {
            find_properties: true,
            find_expressions: true,
        }
    }
}

/// Flattened field listing of a map
#[derive(Debug, Default)]
struct PropertyIndex {
    entries: Vec<PropertyMatch>,
}

impl PropertyIndex {
    fn build(model: &MapModel) -> Self {
        let entries = model
            .groups
            .iter()
            .flat_map(|group| group.items.iter())
            .flat_map(|item| {
                item.fields.iter().enumerate().map(|(index, field)| PropertyMatch {
                    item_id: item.id.clone(),
                    item_name: item.name.clone(),
                    field: field.clone(),
                    field_index: index,
                })
            })
            .collect();
        Self { entries }
    }

    /// Fields whose name contains `query`.
    ///
    /// `field @ item` keeps only fields of items whose name contains `item`,
    /// for maps where two items share a field name.
    fn find_properties(&self, query: &str) -> Vec<PropertyMatch> {
        let query = query.to_lowercase();

        let mut parts = query.split('@');
        if let (Some(field), Some(item)) = (parts.next(), parts.next()) {
            let item = item.trim();
            return self
                .find_properties(field.trim())
                .into_iter()
                .filter(|m| m.item_name.to_lowercase().contains(item))
                .collect();
        }

        if query.chars().count() < MIN_QUERY_LENGTH {
            return Vec::new();
        }

        self.entries
            .iter()
            .filter(|m| m.field.name.to_lowercase().contains(&query))
            .cloned()
            .collect()
    }

    /// Rewrite an `=`-prefixed expression into calculator variables.
    ///
    /// The n-th distinct item referenced becomes letter n (`a`, `b`, ...)
    /// and the variable is that letter followed by the field index.
    fn find_expression(&self, query: &str) -> Option<PropertyHit> {
        let mut expression = query.strip_prefix('=')?.to_string();
        let mut items: Vec<String> = Vec::new();
        let mut references: Vec<(String, PropertyMatch)> = Vec::new();

        while let Some(captures) = REFERENCE.captures(&expression) {
            let whole = captures.get(0)?;
            let range = whole.range();
            let reference = whole.as_str().to_string();

            let field = self.find_properties(&captures[1]).into_iter().next()?;

            let slot = match items.iter().position(|id| *id == field.item_id) {
                Some(slot) => slot,
                None => {
                    items.push(field.item_id.clone());
                    items.len() - 1
                }
            };
            let letter = char::from(b'a' + u8::try_from(slot).ok().filter(|s| *s < 26)?);
            let variable = format!("{letter}{}", field.field_index);

            expression.replace_range(range, &variable);
            if !references.iter().any(|(r, _)| *r == reference) {
                references.push((reference, field));
            }
        }

        if items.is_empty() {
            return None;
        }

        Some(PropertyHit::Expression {
            text: query.to_string(),
            expression,
            references,
            items,
        })
    }
}

/// Property and expression search over the open map
pub struct PropertySearch {
    name: String,
    options: PropertySearchOptions,
    index: RwLock<PropertyIndex>,
}

impl PropertySearch {
    pub fn new(model: &MapModel) -> Self {
        Self {
            name: "Properties".to_string(),
            options: PropertySearchOptions::default(),
            index: RwLock::new(PropertyIndex::build(model)),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_options(mut self, options: PropertySearchOptions) -> Self {
        self.options = options;
        self
    }

    /// Re-index after the map changed
    pub fn update(&self, model: &MapModel) {
        let index = PropertyIndex::build(model);
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = index;
    }

    /// Run both lookups; expressions come first
    pub fn find(&self, text: &str) -> Vec<PropertyHit> {
        let query = text.trim().to_lowercase();
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);

        let mut hits = Vec::new();
        if self.options.find_expressions {
            hits.extend(index.find_expression(&query));
        }
        if self.options.find_properties {
            hits.extend(
                index
                    .find_properties(&query)
                    .into_iter()
                    .map(PropertyHit::Property),
            );
        }
        hits
    }
}

#[async_trait]
impl SearchSource for PropertySearch {
    type Output = Vec<PropertyHit>;

    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &Query) -> Result<Vec<PropertyHit>, ProviderError> {
        Ok(self.find(query.text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, name: &str, fields: &[&str]) -> MapItem {
        MapItem {
            id: id.to_string(),
            name: name.to_string(),
            fields: fields.iter().map(|f| Field::new(*f)).collect(),
        }
    }

    fn model() -> MapModel {
        MapModel {
            groups: vec![MapGroup {
                name: "Default".to_string(),
                items: vec![
                    item("climate", "Climate 2050", &["2040 Temperature", "2050 Temperature"]),
                    item("census", "Census", &["Population", "Area", "Temperature"]),
                    item("empty", "Imagery", &[]),
                ],
            }],
        }
    }

    fn property_names(hits: &[PropertyHit]) -> Vec<(String, String)> {
        hits.iter()
            .filter_map(|hit| match hit {
                PropertyHit::Property(m) => Some((m.item_id.clone(), m.field.name.clone())),
                PropertyHit::Expression { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_property_lookup() {
        let search = PropertySearch::new(&model());

        let hits = search.find("  TEMPERATURE ");
        assert_eq!(hits.len(), 3);

        assert_eq!(
            property_names(&search.find("pop")),
            vec![("census".to_string(), "Population".to_string())]
        );
        assert!(search.find("p").is_empty());
    }

    #[test]
    fn test_item_disambiguation() {
        let search = PropertySearch::new(&model());
        let hits = search.find("temperature @ census");
        assert_eq!(
            property_names(&hits),
            vec![("census".to_string(), "Temperature".to_string())]
        );

        // anything after a second `@` is ignored
        let hits = search.find("temperature @ census @ 2050");
        assert_eq!(
            property_names(&hits),
            vec![("census".to_string(), "Temperature".to_string())]
        );
    }

    #[test]
    fn test_expression_rewrite() {
        let search = PropertySearch::new(&model());
        let hits = search.find("=min([2050 Temperature],[2040 temperature]) - [population]");

        let PropertyHit::Expression {
            expression,
            items,
            references,
            ..
        } = &hits[0]
        else {
            panic!("expected an expression first, got {:?}", hits[0]);
        };
        assert_eq!(expression, "min(a1,a0) - b0");
        assert_eq!(items, &vec!["climate".to_string(), "census".to_string()]);
        assert_eq!(references.len(), 3);
    }

    #[test]
    fn test_unresolved_expression_yields_nothing() {
        let search = PropertySearch::new(&model());
        assert!(search.find("=[rainfall] * 2").is_empty());
        assert!(search.find("=1 + 2").is_empty());
    }

    #[test]
    fn test_update_reindexes() {
        let search = PropertySearch::new(&MapModel::default());
        assert!(search.find("area").is_empty());

        search.update(&model());
        assert_eq!(property_names(&search.find("area")).len(), 1);
    }
}
