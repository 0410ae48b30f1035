//! Search queries and match scoring.
//!
//! A query is either free text or a partial symbol descriptor. Structured
//! queries are scored against candidates by counting exactly-matching
//! fields; the score has no meaning beyond relative ranking within one
//! query. Admission thresholds are computed from the number of fields the
//! query actually carries, so sparse queries are not impossible to satisfy.

use serde::{Deserialize, Serialize};

use crate::symbols::SymbolDescriptor;

/// Partial package identity inside a structured query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "repoURL", default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
}

impl PackageQuery {
    fn field_count(&self) -> usize {
        [
            self.name.is_some(),
            self.version.is_some(),
            self.repo_url.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

/// A partial symbol descriptor: any subset of fields may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageQuery>,
}

impl DescriptorQuery {
    /// Whether no field at all is present.
    pub fn is_empty(&self) -> bool {
        self.field_count() == 0
    }

    /// This query with the package constraint removed. Scoring and
    /// admission use the package-free query; the package constraint is
    /// handled separately (boost or hard filter, depending on operation).
    pub fn without_package(&self) -> Self {
        DescriptorQuery {
            package: None,
            ..self.clone()
        }
    }

    /// Number of present leaf fields, package subfields included.
    pub fn field_count(&self) -> usize {
        let scalar = [
            self.name.is_some(),
            self.container_name.is_some(),
            self.container_kind.is_some(),
            self.kind.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        scalar + self.package.as_ref().map_or(0, PackageQuery::field_count)
    }

    /// The package name constraint, if one is present.
    pub fn package_name(&self) -> Option<&str> {
        self.package.as_ref()?.name.as_deref()
    }

    /// Count of present fields that exactly match the candidate.
    pub fn match_score(&self, candidate: &SymbolDescriptor) -> f64 {
        let mut score = 0usize;
        if matches(&self.name, &candidate.name) {
            score += 1;
        }
        if matches(&self.container_name, &candidate.container_name) {
            score += 1;
        }
        if matches(&self.container_kind, &candidate.container_kind) {
            score += 1;
        }
        if matches(&self.kind, &candidate.kind) {
            score += 1;
        }
        if let (Some(query), Some(package)) = (&self.package, &candidate.package) {
            if matches(&query.name, &package.name) {
                score += 1;
            }
            if query.version.is_some() && query.version == package.version {
                score += 1;
            }
            if query.repo_url.is_some() && query.repo_url == package.repo_url {
                score += 1;
            }
        }
        score as f64
    }
}

fn matches(query: &Option<String>, value: &str) -> bool {
    query.as_deref() == Some(value)
}

/// A workspace search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Free-text query, matched by the engine's navigate-to search.
    Text(String),
    /// Structured partial-descriptor query, matched by field scoring.
    Structured(DescriptorQuery),
}

impl Query {
    /// Whether this is the empty query (cache-eligible).
    pub fn is_empty(&self) -> bool {
        match self {
            Query::Text(text) => text.is_empty(),
            Query::Structured(descriptor) => descriptor.is_empty(),
        }
    }
}
