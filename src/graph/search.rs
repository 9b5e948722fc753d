//! Search / autocomplete over tables, fields and objects
//!
//! Every hit carries a [`Selector`] that can be handed straight to the tracer.
//! Ranking: exact > prefix > substring, then Jaro-Winkler similarity, then label.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use super::trace::Selector;
use super::types::{fold_object_name, normalize_name, FieldRef, LineageGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    Table,
    Field,
    Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEntry {
    /// `TABLE`, `TABLE.FIELD` or the object name
    pub label: String,
    pub kind: SearchKind,
    pub selector: Selector,
    /// Mappings touching the entry
    pub mapping_count: usize,
}

/// How the query matched a label
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRank {
    Exact,
    Prefix,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub entry: SearchEntry,
    pub rank: MatchRank,
    pub similarity: f64,
}

/// Lookup index built once per graph
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    entries: Vec<SearchEntry>,
    tables: BTreeSet<String>,
    fields: BTreeSet<FieldRef>,
    /// Folded object name -> name as supplied
    objects: BTreeMap<String, String>,
}

impl SearchIndex {
    pub fn build(graph: &LineageGraph) -> Self {
        let mut table_counts: BTreeMap<&str, usize> = BTreeMap::new();
        let mut field_counts: BTreeMap<FieldRef, usize> = BTreeMap::new();
        for mapping in graph.mappings() {
            let key = &mapping.key;
            *table_counts.entry(key.source_table.as_str()).or_insert(0) += 1;
            if !key.is_self_table() {
                *table_counts.entry(key.dest_table.as_str()).or_insert(0) += 1;
            }
            *field_counts.entry(key.source()).or_insert(0) += 1;
            *field_counts.entry(key.dest()).or_insert(0) += 1;
        }

        let mut index = SearchIndex::default();

        for table in graph.tables() {
            index.tables.insert(table.name.clone());
            index.entries.push(SearchEntry {
                label: table.name.clone(),
                kind: SearchKind::Table,
                selector: Selector::Table(table.name.clone()),
                mapping_count: table_counts.get(table.name.as_str()).copied().unwrap_or(0),
            });

            for field in table.fields.values() {
                let field_ref = FieldRef {
                    table: table.name.clone(),
                    field: field.name.clone(),
                };
                index.entries.push(SearchEntry {
                    label: field_ref.to_string(),
                    kind: SearchKind::Field,
                    selector: Selector::Field(field_ref.clone()),
                    mapping_count: field_counts.get(&field_ref).copied().unwrap_or(0),
                });
                index.fields.insert(field_ref);
            }
        }

        for (object, count) in graph.objects() {
            index.objects.insert(fold_object_name(object), object.to_string());
            index.entries.push(SearchEntry {
                label: object.to_string(),
                kind: SearchKind::Object,
                selector: Selector::Object(object.to_string()),
                mapping_count: count,
            });
        }

        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ranked case-insensitive substring search
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let needle = query.trim().to_uppercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let label = entry.label.to_uppercase();
                let rank = if label == needle {
                    MatchRank::Exact
                } else if label.starts_with(&needle) {
                    MatchRank::Prefix
                } else if label.contains(&needle) {
                    MatchRank::Contains
                } else {
                    return None;
                };
                Some(SearchHit {
                    entry: entry.clone(),
                    rank,
                    similarity: strsim::jaro_winkler(&needle, &label),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.rank
                .cmp(&b.rank)
                .then_with(|| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal))
                .then_with(|| a.entry.label.cmp(&b.entry.label))
        });
        hits.truncate(limit);
        hits
    }

    pub fn find_table(&self, name: &str) -> Option<Selector> {
        let name = normalize_name(name);
        self.tables.contains(&name).then_some(Selector::Table(name))
    }

    /// Lookup by `TABLE.FIELD` composite
    pub fn find_field(&self, composite: &str) -> Option<Selector> {
        let field = FieldRef::parse(composite)?;
        self.fields.contains(&field).then_some(Selector::Field(field))
    }

    pub fn find_object(&self, name: &str) -> Option<Selector> {
        self.objects
            .get(&fold_object_name(name))
            .map(|object| Selector::Object(object.clone()))
    }
}
