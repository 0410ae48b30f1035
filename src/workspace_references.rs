//! Cross-repository reference search.
//!
//! Finds references to a symbol described by metadata rather than by a
//! position: every identifier in every non-dependency file is resolved to
//! its definition, the definition is scored against the query descriptor,
//! and accepted matches are reported with the referencing location. This
//! scan touches every identifier the workspace has, so admission is much
//! stricter than workspace symbol search.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::engine::TextSpan;
use crate::error::Result;
use crate::packages::PackageResolver;
use crate::position::Location;
use crate::project::{ProjectConfiguration, SourceFile};
use crate::query::DescriptorQuery;
use crate::symbols::{SymbolDescriptor, definition_to_descriptor, location_uri};
use crate::uri::path_to_uri;

/// A reference to a symbol matched by descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceInformation {
    pub symbol: SymbolDescriptor,
    pub reference: Location,
}

/// Upper bound on the admission floor. The floor is the number of fields
/// the query carries, capped here so a fully specified query still admits
/// candidates matching everything but one noisy field pair.
const SCORE_FLOOR_LIMIT: f64 = 4.75;

/// The minimum admissible score for a reference-scan query.
pub fn minimum_score(query: &DescriptorQuery) -> f64 {
    (query.without_package().field_count() as f64).min(SCORE_FLOOR_LIMIT)
}

/// Everything a per-boundary scan needs besides the boundary itself.
#[derive(Clone)]
pub struct ScanParams {
    pub query: DescriptorQuery,
    /// Workspace root path for descriptor normalization.
    pub root_path: String,
    /// Resolves definition locations to owning packages when the query
    /// carries a package constraint.
    pub resolver: PackageResolver,
}

/// Scan a sequence of configuration boundaries lazily.
pub fn scan_configurations(
    configurations: Vec<Arc<dyn ProjectConfiguration>>,
    params: ScanParams,
) -> impl Iterator<Item = Result<ReferenceInformation>> {
    configurations
        .into_iter()
        .flat_map(move |configuration| ConfigurationScan::new(configuration, params.clone()))
}

/// Lazy reference scan over a single configuration boundary.
pub struct ConfigurationScan {
    configuration: Arc<dyn ProjectConfiguration>,
    query_without_package: DescriptorQuery,
    package_name: Option<String>,
    min_score: f64,
    root_path: String,
    resolver: PackageResolver,
    files: VecDeque<String>,
    current: Option<Arc<SourceFile>>,
    spans: VecDeque<TextSpan>,
    pending: VecDeque<ReferenceInformation>,
    started: bool,
    done: bool,
}

impl ConfigurationScan {
    pub fn new(configuration: Arc<dyn ProjectConfiguration>, params: ScanParams) -> Self {
        let min_score = minimum_score(&params.query);
        ConfigurationScan {
            configuration,
            query_without_package: params.query.without_package(),
            package_name: params.query.package_name().map(str::to_string),
            min_score,
            root_path: params.root_path,
            resolver: params.resolver,
            files: VecDeque::new(),
            current: None,
            spans: VecDeque::new(),
            pending: VecDeque::new(),
            started: false,
            done: false,
        }
    }

    fn advance_file(&mut self) -> bool {
        loop {
            let Some(file_name) = self.files.pop_front() else {
                return false;
            };
            let Some(source) = self.configuration.source_file(&file_name) else {
                continue;
            };
            self.spans = self
                .configuration
                .analyzer()
                .identifier_spans(&file_name)
                .into_iter()
                .collect();
            self.current = Some(source);
            return true;
        }
    }

    /// Resolve one identifier and queue its matches, if any. Engine
    /// failures on individual nodes are logged and treated as no match —
    /// one malformed position must not abort the whole boundary scan.
    fn process_span(&mut self, span: TextSpan) {
        let Some(source) = self.current.clone() else {
            return;
        };
        let definitions = match self
            .configuration
            .analyzer()
            .definitions_at(&source.file_name, span.start)
        {
            Ok(definitions) => definitions,
            Err(err) => {
                error!(
                    file = %source.file_name,
                    offset = span.start,
                    %err,
                    "error getting definition during reference scan"
                );
                return;
            }
        };
        for definition in definitions {
            let mut symbol = definition_to_descriptor(&definition, &self.root_path);
            let score = self.query_without_package.match_score(&symbol);
            if score < self.min_score {
                continue;
            }
            if let Some(package_name) = &self.package_name {
                // Cheap path check before the manifest fetch below
                if !definition.file_name.contains(package_name.as_str()) {
                    continue;
                }
                match self
                    .resolver
                    .resolve_package(&path_to_uri(&definition.file_name))
                {
                    Some(descriptor) if descriptor.name == *package_name => {
                        symbol.package = Some(descriptor);
                    }
                    _ => continue,
                }
            }
            self.pending.push_back(ReferenceInformation {
                symbol,
                reference: Location::new(
                    location_uri(&source.file_name),
                    source.range_of(span.start, span.end()),
                ),
            });
        }
    }
}

impl Iterator for ConfigurationScan {
    type Item = Result<ReferenceInformation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            if let Err(err) = self.configuration.ensure_all_files() {
                self.done = true;
                return Some(Err(err));
            }
            self.files = self
                .configuration
                .source_file_names()
                .into_iter()
                .filter(|file_name| !file_name.contains("/node_modules/"))
                .collect();
        }
        loop {
            if let Some(reference) = self.pending.pop_front() {
                return Some(Ok(reference));
            }
            if let Some(span) = self.spans.pop_front() {
                self.process_span(span);
                continue;
            }
            if !self.advance_file() {
                self.done = true;
                return None;
            }
        }
    }
}
