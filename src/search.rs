//! Workspace-wide symbol search.
//!
//! Searches one or more configuration boundaries for symbols matching a
//! text or structured query, producing scored matches lazily — a boundary
//! is only ensured and scanned when the consumer pulls far enough. Match
//! production order is unspecified; ranking happens downstream in the
//! patch aggregator.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::Result;
use crate::packages::PackageManager;
use crate::project::ProjectConfiguration;
use crate::query::Query;
use crate::symbols::{
    SymbolInformation, navigate_to_item_to_symbol_information,
    navigation_tree_to_descriptor, navigation_tree_to_symbol_information, walk_navigation_tree,
    navigation_tree_is_symbol,
};
use crate::uri::{is_standard_library, path_to_uri};

/// Result cap for text and empty queries.
pub const TEXT_QUERY_LIMIT: usize = 100;

/// Result cap for structured queries. Higher than the text cap because a
/// low cap could cut off results that would outscore earlier ones.
pub const STRUCTURED_QUERY_LIMIT: usize = 1000;

/// A scored search result.
pub type Match = (f64, SymbolInformation);

/// The result cap that applies to a query shape.
pub fn result_cap(query: Option<&Query>) -> usize {
    match query {
        Some(Query::Structured(_)) => STRUCTURED_QUERY_LIMIT,
        _ => TEXT_QUERY_LIMIT,
    }
}

/// Everything a per-boundary search needs besides the boundary itself.
#[derive(Clone)]
pub struct SearchParams {
    /// The query; `None` enumerates every symbol with a uniform score.
    pub query: Option<Query>,
    /// Workspace root path for descriptor normalization.
    pub root_path: String,
    /// Restrict candidates to files under this path prefix.
    pub file_prefix: Option<String>,
    /// For the package-name ranking boost.
    pub packages: Arc<dyn PackageManager>,
}

/// Search a sequence of configuration boundaries lazily.
pub fn search_configurations(
    configurations: Vec<Arc<dyn ProjectConfiguration>>,
    params: SearchParams,
) -> impl Iterator<Item = Result<Match>> {
    configurations
        .into_iter()
        .flat_map(move |configuration| ConfigurationSearch::new(configuration, params.clone()))
}

/// Lazy symbol search over a single configuration boundary.
///
/// Standard-library and dependency files are never candidates. Per-file
/// navigation failures are logged and skipped; only the initial
/// `ensure_all_files` failure terminates the boundary scan.
pub struct ConfigurationSearch {
    configuration: Arc<dyn ProjectConfiguration>,
    params: SearchParams,
    files: VecDeque<String>,
    pending: VecDeque<Result<Match>>,
    started: bool,
    done: bool,
}

impl ConfigurationSearch {
    pub fn new(configuration: Arc<dyn ProjectConfiguration>, params: SearchParams) -> Self {
        ConfigurationSearch {
            configuration,
            params,
            files: VecDeque::new(),
            pending: VecDeque::new(),
            started: false,
            done: false,
        }
    }

    fn candidate_file(&self, file_name: &str) -> bool {
        if is_standard_library(file_name) || file_name.contains("/node_modules/") {
            return false;
        }
        match &self.params.file_prefix {
            Some(prefix) => file_name.starts_with(prefix.as_str()),
            None => true,
        }
    }

    fn start(&mut self) -> Result<()> {
        self.configuration.ensure_all_files()?;
        match &self.params.query {
            Some(Query::Text(text)) => {
                // The engine does the text matching; all candidates rank the
                // same. No scoring beyond inclusion.
                let items = self
                    .configuration
                    .analyzer()
                    .navigate_to_items(text, TEXT_QUERY_LIMIT);
                for item in items {
                    if !self.candidate_file(&item.file_name) {
                        continue;
                    }
                    let Some(source) = self.configuration.source_file(&item.file_name) else {
                        debug!(file = %item.file_name, "navigate-to hit in unknown file");
                        continue;
                    };
                    self.pending
                        .push_back(Ok((1.0, navigate_to_item_to_symbol_information(&item, &source))));
                }
            }
            _ => {
                let file_names = self.configuration.source_file_names();
                let mut files = VecDeque::with_capacity(file_names.len());
                for file_name in file_names {
                    if self.candidate_file(&file_name) {
                        files.push_back(file_name);
                    }
                }
                self.files = files;
            }
        }
        Ok(())
    }

    /// Collect the matches of one file's navigation tree into `pending`.
    fn scan_file(&mut self, file_name: &str) {
        let tree = match self.configuration.analyzer().navigation_tree(file_name) {
            Ok(tree) => tree,
            Err(err) => {
                error!(file = file_name, %err, "could not get navigation tree for file");
                return;
            }
        };
        let Some(source) = self.configuration.source_file(file_name) else {
            debug!(file = file_name, "source file disappeared during search");
            return;
        };

        let structured = match &self.params.query {
            Some(Query::Structured(query)) => Some(query.clone()),
            _ => None,
        };
        let scoring = structured.as_ref().map(|query| {
            let without_package = query.without_package();
            // Require at least 2 matching fields, or all of them when the
            // query carries fewer. The package boost below is not part of
            // this admission check; it only affects ranking.
            let threshold = (without_package.field_count() as f64).min(2.0);
            (without_package, threshold)
        });

        // The package-name boost depends only on the file, resolve it once
        let package_boost = match structured.as_ref().and_then(|query| query.package_name()) {
            Some(package_name) => {
                match self.params.packages.closest_package_json(&path_to_uri(file_name)) {
                    Ok(Some(manifest)) => manifest.name.as_deref() == Some(package_name),
                    Ok(None) => false,
                    Err(err) => {
                        warn!(file = file_name, %err, "could not resolve manifest for boost");
                        false
                    }
                }
            }
            None => false,
        };

        for node in walk_navigation_tree(&tree) {
            if !navigation_tree_is_symbol(node.tree) {
                continue;
            }
            let score = match &scoring {
                None => 1.0,
                Some((query, threshold)) => {
                    let descriptor = navigation_tree_to_descriptor(
                        node.tree,
                        node.parent,
                        file_name,
                        &self.params.root_path,
                    );
                    let score = query.match_score(&descriptor);
                    if score < *threshold {
                        continue;
                    }
                    if package_boost { score + 1.0 } else { score }
                }
            };
            if let Some(info) =
                navigation_tree_to_symbol_information(node.tree, node.parent, &source)
            {
                self.pending.push_back(Ok((score, info)));
            }
        }
    }
}

impl Iterator for ConfigurationSearch {
    type Item = Result<Match>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            if let Err(err) = self.start() {
                self.done = true;
                return Some(Err(err));
            }
        }
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            let Some(file_name) = self.files.pop_front() else {
                self.done = true;
                return None;
            };
            self.scan_file(&file_name);
        }
    }
}
