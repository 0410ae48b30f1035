//! In-memory fakes for the session's collaborators.
//!
//! A `WorkspaceBuilder` assembles files, manifests, configuration
//! boundaries and scripted analyzer answers into a `Fixture` holding a
//! ready `Session` plus handles to observe client traffic.

// Not every test binary uses every fake
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tsnav::client::{LanguageClient, PublishDiagnosticsParams};
use tsnav::config::FormatCodeSettings;
use tsnav::engine::{
    CodeFixAction, CompletionEntry, CompletionEntryDetails, DefinitionEntry, EngineDiagnostic,
    LanguageAnalyzer, NavigateToItem, NavigationTree, QuickInfo, ReferenceEntry, RenameInfo,
    RenameLocation, SignatureHelpItems, TextSpan,
};
use tsnav::error::{EngineError, Error, Result};
use tsnav::fs::OverlayStore;
use tsnav::packages::{PackageManager, PackageManifest};
use tsnav::project::{ProjectConfiguration, ProjectManager, SourceFile};
use tsnav::protocol::InitializeParams;
use tsnav::rename::WorkspaceEdit;
use tsnav::session::{Session, SessionOptions};
use tsnav::uri::{path_to_uri, uri_to_path};

fn key(file_name: &str, offset: u32) -> (String, u32) {
    (file_name.to_string(), offset)
}

// =============================================================================
// Overlay store
// =============================================================================

pub struct FakeOverlay {
    files: Mutex<BTreeMap<String, String>>,
}

impl FakeOverlay {
    pub fn new(files: BTreeMap<String, String>) -> Self {
        FakeOverlay {
            files: Mutex::new(files),
        }
    }
}

impl OverlayStore for FakeOverlay {
    fn ensure(&self, uri: &str) -> Result<()> {
        if self.files.lock().unwrap().contains_key(uri) {
            Ok(())
        } else {
            Err(Error::FileSystem {
                uri: uri.to_string(),
                message: "no such file".to_string(),
            })
        }
    }

    fn ensure_structure(&self) -> Result<()> {
        Ok(())
    }

    fn content(&self, uri: &str) -> Result<String> {
        self.files
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::FileSystem {
                uri: uri.to_string(),
                message: "no such file".to_string(),
            })
    }

    fn uris(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

// =============================================================================
// Package manager
// =============================================================================

pub struct FakePackages {
    overlay: Arc<FakeOverlay>,
}

impl FakePackages {
    pub fn new(overlay: Arc<FakeOverlay>) -> Self {
        FakePackages { overlay }
    }
}

impl PackageManager for FakePackages {
    fn package_json(&self, uri: &str) -> Result<PackageManifest> {
        let content = self.overlay.content(uri)?;
        serde_json::from_str(&content).map_err(|err| Error::FileSystem {
            uri: uri.to_string(),
            message: err.to_string(),
        })
    }

    fn closest_package_json(&self, uri: &str) -> Result<Option<PackageManifest>> {
        let mut prefix = uri.trim_end_matches('/');
        loop {
            let Some(slash) = prefix.rfind('/') else {
                return Ok(None);
            };
            prefix = &prefix[..slash];
            if prefix.is_empty() || prefix.ends_with("//") {
                return Ok(None);
            }
            let candidate = format!("{prefix}/package.json");
            if self.overlay.ensure(&candidate).is_ok() {
                return self.package_json(&candidate).map(Some);
            }
        }
    }

    fn package_json_uris(&self) -> Vec<String> {
        self.overlay
            .uris()
            .into_iter()
            .filter(|uri| uri.ends_with("/package.json") && !uri.contains("/node_modules/"))
            .collect()
    }
}

// =============================================================================
// Analysis engine
// =============================================================================

#[derive(Default)]
pub struct FakeAnalyzer {
    pub definitions: HashMap<(String, u32), Vec<DefinitionEntry>>,
    /// Positions at which `definitions_at` fails with an engine error.
    pub failing_positions: HashSet<(String, u32)>,
    pub references: HashMap<(String, u32), Vec<ReferenceEntry>>,
    pub quick_infos: HashMap<(String, u32), QuickInfo>,
    pub completions: HashMap<(String, u32), Vec<CompletionEntry>>,
    pub completion_details: HashMap<String, CompletionEntryDetails>,
    pub navigation_trees: HashMap<String, NavigationTree>,
    /// Files whose navigation tree request fails.
    pub failing_navigation: HashSet<String>,
    pub navigate_to: Vec<NavigateToItem>,
    pub signature_help: HashMap<(String, u32), SignatureHelpItems>,
    pub code_fixes: Vec<CodeFixAction>,
    pub rename_infos: HashMap<(String, u32), RenameInfo>,
    pub rename_locations: HashMap<(String, u32), Vec<RenameLocation>>,
    pub identifiers: HashMap<String, Vec<TextSpan>>,
    pub syntactic: HashMap<String, Vec<EngineDiagnostic>>,
    pub semantic: HashMap<String, Vec<EngineDiagnostic>>,
    pub navigation_tree_calls: Mutex<usize>,
}

impl FakeAnalyzer {
    pub fn define(&mut self, file: &str, offset: u32, definition: DefinitionEntry) {
        self.definitions
            .entry(key(file, offset))
            .or_default()
            .push(definition);
    }
}

impl LanguageAnalyzer for FakeAnalyzer {
    fn definitions_at(
        &self,
        file_name: &str,
        offset: u32,
    ) -> std::result::Result<Vec<DefinitionEntry>, EngineError> {
        if self.failing_positions.contains(&key(file_name, offset)) {
            return Err(EngineError("synthetic engine failure".to_string()));
        }
        Ok(self
            .definitions
            .get(&key(file_name, offset))
            .cloned()
            .unwrap_or_default())
    }

    fn references_at(&self, file_name: &str, offset: u32) -> Vec<ReferenceEntry> {
        self.references
            .get(&key(file_name, offset))
            .cloned()
            .unwrap_or_default()
    }

    fn quick_info_at(&self, file_name: &str, offset: u32) -> Option<QuickInfo> {
        self.quick_infos.get(&key(file_name, offset)).cloned()
    }

    fn completions_at(&self, file_name: &str, offset: u32) -> Option<Vec<CompletionEntry>> {
        self.completions.get(&key(file_name, offset)).cloned()
    }

    fn completion_entry_details(
        &self,
        _file_name: &str,
        _offset: u32,
        entry_name: &str,
    ) -> Option<CompletionEntryDetails> {
        self.completion_details.get(entry_name).cloned()
    }

    fn navigation_tree(
        &self,
        file_name: &str,
    ) -> std::result::Result<NavigationTree, EngineError> {
        *self.navigation_tree_calls.lock().unwrap() += 1;
        if self.failing_navigation.contains(file_name) {
            return Err(EngineError("synthetic navigation failure".to_string()));
        }
        self.navigation_trees
            .get(file_name)
            .cloned()
            .ok_or_else(|| EngineError(format!("no navigation tree for {file_name}")))
    }

    fn navigate_to_items(&self, query: &str, max_results: usize) -> Vec<NavigateToItem> {
        self.navigate_to
            .iter()
            .filter(|item| item.name.contains(query))
            .take(max_results)
            .cloned()
            .collect()
    }

    fn signature_help_at(&self, file_name: &str, offset: u32) -> Option<SignatureHelpItems> {
        self.signature_help.get(&key(file_name, offset)).cloned()
    }

    fn code_fixes_at(
        &self,
        _file_name: &str,
        _start: u32,
        _end: u32,
        _error_codes: &[u32],
        _format: &FormatCodeSettings,
    ) -> Vec<CodeFixAction> {
        self.code_fixes.clone()
    }

    fn rename_info(&self, file_name: &str, offset: u32) -> RenameInfo {
        self.rename_infos
            .get(&key(file_name, offset))
            .cloned()
            .unwrap_or(RenameInfo {
                can_rename: false,
                localized_error_message: None,
            })
    }

    fn rename_locations(&self, file_name: &str, offset: u32) -> Vec<RenameLocation> {
        self.rename_locations
            .get(&key(file_name, offset))
            .cloned()
            .unwrap_or_default()
    }

    fn identifier_spans(&self, file_name: &str) -> Vec<TextSpan> {
        self.identifiers.get(file_name).cloned().unwrap_or_default()
    }

    fn syntactic_diagnostics(&self, file_name: &str) -> Vec<EngineDiagnostic> {
        self.syntactic.get(file_name).cloned().unwrap_or_default()
    }

    fn semantic_diagnostics(&self, file_name: &str) -> Vec<EngineDiagnostic> {
        self.semantic.get(file_name).cloned().unwrap_or_default()
    }
}

// =============================================================================
// Project manager
// =============================================================================

pub struct FakeConfiguration {
    pub config_path: String,
    pub root_dir: String,
    pub sources: BTreeMap<String, Arc<SourceFile>>,
    pub analyzer: Arc<FakeAnalyzer>,
}

impl ProjectConfiguration for FakeConfiguration {
    fn config_file_path(&self) -> &str {
        &self.config_path
    }

    fn ensure_basic_files(&self) -> Result<()> {
        Ok(())
    }

    fn ensure_all_files(&self) -> Result<()> {
        Ok(())
    }

    fn analyzer(&self) -> &dyn LanguageAnalyzer {
        self.analyzer.as_ref()
    }

    fn source_file(&self, file_name: &str) -> Option<Arc<SourceFile>> {
        self.sources.get(file_name).cloned()
    }

    fn source_file_names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }
}

#[derive(Default)]
pub struct FakeProjects {
    pub configurations: Vec<Arc<FakeConfiguration>>,
    pub events: Mutex<Vec<String>>,
}

impl FakeProjects {
    fn owning(&self, path: &str) -> Option<Arc<FakeConfiguration>> {
        self.configurations
            .iter()
            .filter(|config| path.starts_with(&config.root_dir))
            .max_by_key(|config| config.root_dir.len())
            .cloned()
    }
}

impl ProjectManager for FakeProjects {
    fn ensure_own_files(&self) -> Result<()> {
        Ok(())
    }

    fn ensure_all_files(&self) -> Result<()> {
        Ok(())
    }

    fn ensure_referenced_files(&self, _uri: &str) -> Result<()> {
        Ok(())
    }

    fn ensure_module_structure(&self) -> Result<()> {
        Ok(())
    }

    fn configuration_for(&self, file_path: &str) -> Result<Arc<dyn ProjectConfiguration>> {
        self.owning(file_path)
            .map(|config| config as Arc<dyn ProjectConfiguration>)
            .ok_or_else(|| Error::Precondition(format!("no configuration for {file_path}")))
    }

    fn parent_configuration(&self, uri: &str) -> Option<Arc<dyn ProjectConfiguration>> {
        self.owning(&uri_to_path(uri))
            .map(|config| config as Arc<dyn ProjectConfiguration>)
    }

    fn child_configurations(&self, dir_uri: &str) -> Vec<Arc<dyn ProjectConfiguration>> {
        let dir_path = uri_to_path(dir_uri);
        self.configurations
            .iter()
            .filter(|config| config.root_dir.starts_with(&dir_path))
            .map(|config| config.clone() as Arc<dyn ProjectConfiguration>)
            .collect()
    }

    fn configurations(&self) -> Vec<Arc<dyn ProjectConfiguration>> {
        self.configurations
            .iter()
            .map(|config| config.clone() as Arc<dyn ProjectConfiguration>)
            .collect()
    }

    fn has_file(&self, file_name: &str) -> bool {
        self.configurations
            .iter()
            .any(|config| config.sources.contains_key(file_name))
    }

    fn did_open(&self, uri: &str, _text: &str) {
        self.events.lock().unwrap().push(format!("open {uri}"));
    }

    fn did_change(&self, uri: &str, _text: &str) {
        self.events.lock().unwrap().push(format!("change {uri}"));
    }

    fn did_save(&self, uri: &str) {
        self.events.lock().unwrap().push(format!("save {uri}"));
    }

    fn did_close(&self, uri: &str) {
        self.events.lock().unwrap().push(format!("close {uri}"));
    }
}

// =============================================================================
// Language client
// =============================================================================

#[derive(Default)]
pub struct RecordingClient {
    pub published: Mutex<Vec<PublishDiagnosticsParams>>,
    pub applied_edits: Mutex<Vec<WorkspaceEdit>>,
}

impl LanguageClient for RecordingClient {
    fn publish_diagnostics(&self, params: PublishDiagnosticsParams) {
        self.published.lock().unwrap().push(params);
    }

    fn apply_workspace_edit(&self, edit: WorkspaceEdit) -> Result<()> {
        self.applied_edits.lock().unwrap().push(edit);
        Ok(())
    }
}

// =============================================================================
// Workspace builder
// =============================================================================

pub struct WorkspaceBuilder {
    root: String,
    files: BTreeMap<String, String>,
    configurations: Vec<Arc<FakeConfiguration>>,
}

impl WorkspaceBuilder {
    pub fn new(root: &str) -> Self {
        WorkspaceBuilder {
            root: root.to_string(),
            files: BTreeMap::new(),
            configurations: Vec::new(),
        }
    }

    /// Add a file by path; the overlay stores it under its `file://` URI.
    pub fn file(mut self, path: &str, text: &str) -> Self {
        self.files.insert(path_to_uri(path), text.to_string());
        self
    }

    /// Add a configuration boundary rooted at `root_dir` with the given
    /// source files (which must have been added with `file`).
    pub fn configuration(
        mut self,
        config_path: &str,
        root_dir: &str,
        file_paths: &[&str],
        analyzer: Arc<FakeAnalyzer>,
    ) -> Self {
        let mut sources = BTreeMap::new();
        for path in file_paths {
            let text = self
                .files
                .get(&path_to_uri(path))
                .cloned()
                .unwrap_or_default();
            sources.insert(path.to_string(), Arc::new(SourceFile::new(*path, text)));
        }
        self.configurations.push(Arc::new(FakeConfiguration {
            config_path: config_path.to_string(),
            root_dir: root_dir.to_string(),
            sources,
            analyzer,
        }));
        self
    }

    pub fn build(self) -> Fixture {
        let overlay = Arc::new(FakeOverlay::new(self.files));
        let packages = Arc::new(FakePackages::new(overlay.clone()));
        let projects = Arc::new(FakeProjects {
            configurations: self.configurations,
            events: Mutex::new(Vec::new()),
        });
        let client = Arc::new(RecordingClient::default());
        let session = Session::new(
            projects.clone(),
            packages.clone(),
            overlay.clone(),
            client.clone(),
            SessionOptions {
                diagnostics_debounce: Duration::ZERO,
            },
        );
        Fixture {
            root_uri: format!("{}/", path_to_uri(&self.root)),
            session,
            overlay,
            packages,
            projects,
            client,
        }
    }
}

pub struct Fixture {
    pub root_uri: String,
    pub session: Session,
    pub overlay: Arc<FakeOverlay>,
    pub packages: Arc<FakePackages>,
    pub projects: Arc<FakeProjects>,
    pub client: Arc<RecordingClient>,
}

impl Fixture {
    /// Run `initialize` with this workspace's root.
    pub fn initialize(&self) {
        self.initialize_with(InitializeParams::default());
    }

    /// Run `initialize` with snippet-capable completion support.
    pub fn initialize_with_snippets(&self) {
        let mut params = InitializeParams::default();
        params
            .capabilities
            .text_document
            .completion
            .completion_item
            .snippet_support = true;
        self.initialize_with(params);
    }

    fn initialize_with(&self, mut params: InitializeParams) {
        params.root_uri = Some(self.root_uri.clone());
        let stream = self.session.initialize(&params);
        stream.build().expect("initialize must not fail");
    }
}

// =============================================================================
// Engine data helpers
// =============================================================================

pub fn span(start: u32, length: u32) -> TextSpan {
    TextSpan::new(start, length)
}

pub fn definition(file: &str, start: u32, length: u32, kind: &str, name: &str) -> DefinitionEntry {
    DefinitionEntry {
        file_name: file.to_string(),
        text_span: span(start, length),
        kind: kind.to_string(),
        name: name.to_string(),
        container_kind: String::new(),
        container_name: String::new(),
    }
}

pub fn nav_node(text: &str, kind: &str, node_span: TextSpan) -> NavigationTree {
    NavigationTree {
        text: text.to_string(),
        kind: kind.to_string(),
        spans: vec![node_span],
        child_items: Vec::new(),
    }
}

pub fn nav_root(children: Vec<NavigationTree>) -> NavigationTree {
    NavigationTree {
        text: "module".to_string(),
        kind: "script".to_string(),
        spans: vec![span(0, 0)],
        child_items: children,
    }
}

/// Drain a patch stream into its reconstructed document, panicking on any
/// stream error.
pub fn build_value(stream: tsnav::PatchStream) -> serde_json::Value {
    stream
        .build()
        .expect("stream must not fail")
        .expect("stream must produce a document")
}
