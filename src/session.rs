//! The per-connection orchestration session.
//!
//! There is a one-to-one correspondence between connection, `Session`, and
//! workspace. A session is created around its collaborators, told about the
//! workspace by `initialize`, and discarded at shutdown; nothing it caches
//! outlives the connection. Request methods return patch streams
//! ([`PatchStream`]); notification methods return nothing and talk to the
//! client directly.
//!
//! Mutable session state (settings, the empty-query memo) sits behind
//! mutexes: the host event loop serializes mutations, but each request
//! still takes a fresh snapshot at its start so a mid-request
//! configuration change cannot be observed halfway through.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::client::{LanguageClient, PublishDiagnosticsParams};
use crate::completions::{CompletionData, CompletionItem, completion_kind, snippet_insert_text};
use crate::config::{FormatCodeSettings, Settings, merge_settings};
use crate::diagnostics::convert_diagnostic;
use crate::engine::FileTextChanges;
use crate::error::{Error, Result};
use crate::fs::OverlayStore;
use crate::hover::{Hover, hover_from_quick_info};
use crate::packages::{
    DEFINITELY_TYPED_NAME, PackageDescriptor, PackageInformation, PackageManager, PackageResolver,
    TYPES_NAMESPACE,
};
use crate::patch::{PatchOp, PatchStream, RankedPatches, defer, to_json};
use crate::position::Location;
use crate::project::{ProjectConfiguration, ProjectManager, SourceFile};
use crate::completions::InsertTextFormat;
use crate::protocol::{
    CodeActionParams, Command, DidChangeConfigurationParams, DidChangeTextDocumentParams,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, DidSaveTextDocumentParams,
    DocumentSymbolParams, ExecuteCommandParams, InitializeParams, InitializeResult,
    ParameterInformation, ReferenceParams, RenameParams, SignatureHelp, SignatureInformation,
    TextDocumentPositionParams, WorkspaceReferenceParams, WorkspaceSymbolParams,
};
use crate::query::Query;
use crate::rename::{TextEdit, WorkspaceEdit, empty_edit_map_patch, rename_patches};
use crate::search::{SearchParams, result_cap, search_configurations};
use crate::symbols::{
    SymbolLocationInformation, definition_to_descriptor, location_uri,
    navigation_tree_to_symbol_information, navigation_tree_is_symbol, walk_navigation_tree,
};
use crate::uri::{normalize_uri, path_to_uri, uri_to_path};
use crate::workspace_references::{ScanParams, scan_configurations};

/// Tunables of a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Delay between an edit notification and diagnostics publication,
    /// coalescing rapid successive edits.
    pub diagnostics_debounce: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            diagnostics_debounce: Duration::from_millis(200),
        }
    }
}

/// Workspace facts established by `initialize`.
#[derive(Debug, Clone)]
struct WorkspaceState {
    root_path: String,
    /// Always ends with a slash — the root refers to a directory.
    root_uri: String,
    /// Whether the root manifest names this workspace as DefinitelyTyped.
    is_definitely_typed: bool,
    /// Whether the client renders snippet-format completions.
    supports_snippets: bool,
}

/// One language workspace session.
pub struct Session {
    projects: Arc<dyn ProjectManager>,
    packages: Arc<dyn PackageManager>,
    overlay: Arc<dyn OverlayStore>,
    client: Arc<dyn LanguageClient>,
    resolver: PackageResolver,
    options: SessionOptions,
    settings: Mutex<Settings>,
    workspace: Mutex<Option<WorkspaceState>>,
    /// Memoized patch sequence for the empty workspace/symbol query.
    /// Invalidated by `workspace/didChangeConfiguration`.
    empty_query_symbols: Mutex<Option<Arc<Vec<PatchOp>>>>,
}

impl Session {
    pub fn new(
        projects: Arc<dyn ProjectManager>,
        packages: Arc<dyn PackageManager>,
        overlay: Arc<dyn OverlayStore>,
        client: Arc<dyn LanguageClient>,
        options: SessionOptions,
    ) -> Self {
        let resolver = PackageResolver::new(overlay.clone(), packages.clone());
        Session {
            projects,
            packages,
            overlay,
            client,
            resolver,
            options,
            settings: Mutex::new(Settings::default()),
            workspace: Mutex::new(None),
            empty_query_symbols: Mutex::new(None),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// The first request of a connection: records the workspace root,
    /// detects DefinitelyTyped from the root manifest, and advertises
    /// capabilities.
    pub fn initialize(&self, params: &InitializeParams) -> PatchStream {
        if params.root_uri.is_some() || params.root_path.is_some() {
            let root_path = params
                .root_path
                .clone()
                .unwrap_or_else(|| uri_to_path(params.root_uri.as_deref().unwrap_or_default()));
            let root_path = if root_path.len() > 1 {
                root_path.trim_end_matches('/').to_string()
            } else {
                root_path
            };
            let mut root_uri = params
                .root_uri
                .clone()
                .unwrap_or_else(|| path_to_uri(&root_path));
            // The root URI always refers to a directory
            if !root_uri.ends_with('/') {
                root_uri.push('/');
            }

            let manifest_uri = format!("{root_uri}package.json");
            let is_definitely_typed = match self.packages.package_json(&manifest_uri) {
                Ok(manifest) => manifest.name.as_deref() == Some(DEFINITELY_TYPED_NAME),
                Err(err) => {
                    debug!(uri = %manifest_uri, %err, "no readable root manifest");
                    false
                }
            };

            let supports_snippets = params
                .capabilities
                .text_document
                .completion
                .completion_item
                .snippet_support;

            *self.workspace_lock() = Some(WorkspaceState {
                root_path,
                root_uri,
                is_definitely_typed,
                supports_snippets,
            });
        }

        PatchStream::single(to_json(&InitializeResult::default()))
    }

    /// Post-initialize notification. Nothing to do.
    pub fn initialized(&self) {}

    /// Shut the session down. The caller drops the session afterwards; the
    /// response is a `null` document.
    pub fn shutdown(&self) -> PatchStream {
        *self.workspace_lock() = None;
        *self.memo_lock() = None;
        PatchStream::single(Value::Null)
    }

    /// Settings update. Deep-merged; invalidates the empty-query memo.
    pub fn workspace_did_change_configuration(&self, params: &DidChangeConfigurationParams) {
        merge_settings(&mut self.settings_lock(), &params.settings);
        *self.memo_lock() = None;
    }

    // =========================================================================
    // Position requests
    // =========================================================================

    /// Definition locations of the symbol at a position. Streams a
    /// `Location[]`.
    pub fn text_document_definition(&self, params: &TextDocumentPositionParams) -> PatchStream {
        match self.definition_locations(params) {
            Ok(locations) => {
                PatchStream::appending(locations.into_iter().map(|location| Ok(to_json(&location))))
            }
            Err(err) => PatchStream::fail(err),
        }
    }

    /// Like definition, but returns symbol metadata with package
    /// attribution, and the concrete location is optional. Streams a
    /// `SymbolLocationInformation[]`.
    pub fn text_document_xdefinition(&self, params: &TextDocumentPositionParams) -> PatchStream {
        match self.symbol_location_informations(params) {
            Ok(symbols) => {
                PatchStream::appending(symbols.into_iter().map(|symbol| Ok(to_json(&symbol))))
            }
            Err(err) => PatchStream::fail(err),
        }
    }

    /// Hover information at a position. Streams a single `Hover`.
    pub fn text_document_hover(&self, params: &TextDocumentPositionParams) -> PatchStream {
        match self.hover(params) {
            Ok(hover) => PatchStream::single(to_json(&hover)),
            Err(err) => PatchStream::fail(err),
        }
    }

    /// References to the symbol at a position within the own workspace,
    /// dependency files excluded. Streams a `Location[]`.
    pub fn text_document_references(&self, params: &ReferenceParams) -> PatchStream {
        match self.reference_locations(params) {
            Ok(locations) => {
                PatchStream::appending(locations.into_iter().map(|location| Ok(to_json(&location))))
            }
            Err(err) => PatchStream::fail(err),
        }
    }

    /// All symbols of one document. Streams a `SymbolInformation[]`.
    pub fn text_document_document_symbol(&self, params: &DocumentSymbolParams) -> PatchStream {
        match self.document_symbols(&params.text_document.uri) {
            Ok(symbols) => {
                PatchStream::appending(symbols.into_iter().map(|symbol| Ok(to_json(&symbol))))
            }
            Err(err) => PatchStream::fail(err),
        }
    }

    // =========================================================================
    // Workspace search
    // =========================================================================

    /// Workspace-wide symbol search. Streams a rank-ordered
    /// `SymbolInformation[]`; an empty query replays the per-session memo.
    pub fn workspace_symbol(&self, params: &WorkspaceSymbolParams) -> PatchStream {
        let query = match (&params.query, &params.symbol) {
            (Some(text), _) if !text.is_empty() => Some(Query::Text(text.clone())),
            (_, Some(symbol)) => Some(Query::Structured(symbol.clone())),
            _ => None,
        };
        let cache_eligible = query.as_ref().is_none_or(Query::is_empty);

        if cache_eligible {
            if let Some(cached) = self.memo_lock().clone() {
                return PatchStream::replay(cached);
            }
        }

        let state = match self.workspace_state() {
            Ok(state) => state,
            Err(err) => return PatchStream::fail(err),
        };

        let (configurations, file_prefix, query) = if state.is_definitely_typed {
            match self.definitely_typed_search_scope(&state, query) {
                Ok(scope) => scope,
                Err(err) => return PatchStream::fail(err),
            }
        } else {
            match self.regular_search_scope(query) {
                Ok(scope) => scope,
                Err(err) => return PatchStream::fail(err),
            }
        };

        let cap = result_cap(query.as_ref());
        let matches = search_configurations(
            configurations,
            SearchParams {
                query,
                root_path: state.root_path,
                file_prefix,
                packages: self.packages.clone(),
            },
        )
        .map(|item| item.map(|(score, info)| (score, to_json(&info))));
        let stream = PatchStream::new(RankedPatches::new(matches, cap));

        if cache_eligible {
            return self.record_empty_query_stream(stream);
        }
        stream
    }

    /// References to a symbol described by metadata, across the workspace.
    /// Streams a `ReferenceInformation[]`.
    pub fn workspace_xreferences(&self, params: &WorkspaceReferenceParams) -> PatchStream {
        let state = match self.workspace_state() {
            Ok(state) => state,
            Err(err) => return PatchStream::fail(err),
        };
        if state.is_definitely_typed {
            return PatchStream::fail(Error::unsupported(
                "workspace/xreferences is not supported on DefinitelyTyped",
            ));
        }
        if let Err(err) = self.projects.ensure_all_files() {
            return PatchStream::fail(err);
        }

        let configurations = match params
            .hints
            .as_ref()
            .and_then(|hints| hints.dependee_package_name.as_deref())
        {
            Some(package_name) => self.configurations_owning_package(package_name),
            None => self.projects.configurations(),
        };

        let scan = scan_configurations(
            configurations,
            ScanParams {
                query: params.query.clone(),
                root_path: state.root_path,
                resolver: self.resolver.clone(),
            },
        );
        PatchStream::appending(scan.map(|item| item.map(|reference| to_json(&reference))))
    }

    /// Every package of the workspace with its dependencies. Streams a
    /// `PackageInformation[]`.
    pub fn workspace_xpackages(&self) -> PatchStream {
        let state = match self.workspace_state() {
            Ok(state) => state,
            Err(err) => return PatchStream::fail(err),
        };
        if state.is_definitely_typed {
            return match self.definitely_typed_packages(&state) {
                Ok(packages) => PatchStream::appending(
                    packages.into_iter().map(|package| Ok(to_json(&package))),
                ),
                Err(err) => PatchStream::fail(err),
            };
        }
        match self.own_package_informations() {
            Ok(packages) => {
                PatchStream::appending(packages.into_iter().map(|package| Ok(to_json(&package))))
            }
            Err(err) => PatchStream::fail(err),
        }
    }

    /// Every dependency declared by the workspace's manifests. Streams a
    /// `DependencyReference[]`. Superseded by `workspace_xpackages`.
    pub fn workspace_xdependencies(&self) -> PatchStream {
        match self.own_package_informations() {
            Ok(packages) => PatchStream::appending(
                packages
                    .into_iter()
                    .flat_map(|package| package.dependencies)
                    .map(|dependency| Ok(to_json(&dependency))),
            ),
            Err(err) => PatchStream::fail(err),
        }
    }

    // =========================================================================
    // Completion, signature help, code actions
    // =========================================================================

    /// Completions at a position. Streams a `CompletionList`.
    pub fn text_document_completion(&self, params: &TextDocumentPositionParams) -> PatchStream {
        match self.completion_patches(params) {
            Ok(patches) => PatchStream::new(patches.into_iter().map(Ok)),
            Err(err) => PatchStream::fail(err),
        }
    }

    /// Fill in details for a completion item selected by the client.
    /// Streams a single `CompletionItem`.
    pub fn completion_item_resolve(&self, item: CompletionItem) -> PatchStream {
        match self.resolve_completion_item(item) {
            Ok(resolved) => PatchStream::single(to_json(&resolved)),
            Err(err) => PatchStream::fail(err),
        }
    }

    /// Signature help at a call position. Streams a single `SignatureHelp`.
    pub fn text_document_signature_help(&self, params: &TextDocumentPositionParams) -> PatchStream {
        match self.signature_help(params) {
            Ok(help) => PatchStream::single(to_json(&help)),
            Err(err) => PatchStream::fail(err),
        }
    }

    /// Code-fix commands for a range. Streams a `Command[]`.
    pub fn text_document_code_action(&self, params: &CodeActionParams) -> PatchStream {
        match self.code_actions(params) {
            Ok(commands) => {
                PatchStream::appending(commands.into_iter().map(|command| Ok(to_json(&command))))
            }
            Err(err) => PatchStream::fail(err),
        }
    }

    /// Execute a server command. Only `codeFix` exists: it applies engine
    /// file edits through the client's applyEdit request. Streams `null`.
    pub fn workspace_execute_command(&self, params: &ExecuteCommandParams) -> PatchStream {
        match params.command.as_str() {
            "codeFix" => {
                if params.arguments.is_empty() {
                    return PatchStream::fail(Error::precondition(
                        "command codeFix requires arguments",
                    ));
                }
                let mut changes = Vec::with_capacity(params.arguments.len());
                for argument in &params.arguments {
                    match serde_json::from_value::<FileTextChanges>(argument.clone()) {
                        Ok(change) => changes.push(change),
                        Err(err) => {
                            return PatchStream::fail(Error::precondition(format!(
                                "malformed codeFix argument: {err}"
                            )));
                        }
                    }
                }
                match self.execute_code_fix(changes) {
                    Ok(()) => PatchStream::single(Value::Null),
                    Err(err) => PatchStream::fail(err),
                }
            }
            other => PatchStream::fail(Error::unsupported(format!("unknown command {other}"))),
        }
    }

    // =========================================================================
    // Rename
    // =========================================================================

    /// Workspace-wide rename of the symbol at a position. Streams an
    /// edit-map document; the shape patch is emitted before the rename
    /// gate, so a refused rename yields exactly the empty edit map plus the
    /// error.
    pub fn text_document_rename(&self, params: &RenameParams) -> PatchStream {
        let projects = self.projects.clone();
        let uri = normalize_uri(&params.text_document.uri);
        let position = params.position;
        let new_name = params.new_name.clone();

        let edits = defer(move || {
            let computed = (|| -> Result<Vec<(String, TextEdit)>> {
                projects.ensure_own_files()?;
                let configuration = projects.parent_configuration(&uri).ok_or_else(|| {
                    Error::precondition(format!("configuration not found for {uri}"))
                })?;
                configuration.ensure_all_files()?;
                let file_path = uri_to_path(&uri);
                let source = configuration.source_file(&file_path).ok_or_else(|| {
                    Error::precondition(format!("unknown text document {uri}"))
                })?;
                let offset = source.offset_at(position).ok_or_else(|| {
                    Error::precondition(format!("position out of range in {uri}"))
                })?;

                let info = configuration.analyzer().rename_info(&file_path, offset);
                if !info.can_rename {
                    return Err(Error::Rename(
                        info.localized_error_message
                            .unwrap_or_else(|| "This symbol cannot be renamed".to_string()),
                    ));
                }

                let locations = configuration.analyzer().rename_locations(&file_path, offset);
                let mut edits = Vec::with_capacity(locations.len());
                for location in locations {
                    let source =
                        configuration
                            .source_file(&location.file_name)
                            .ok_or_else(|| {
                                Error::precondition(format!(
                                    "expected source file {} to exist in configuration",
                                    location.file_name
                                ))
                            })?;
                    edits.push((
                        path_to_uri(&location.file_name),
                        TextEdit::new(
                            source.range_of(location.text_span.start, location.text_span.end()),
                            new_name.clone(),
                        ),
                    ));
                }
                Ok(edits)
            })();
            let boxed: Box<dyn Iterator<Item = Result<PatchOp>>> = match computed {
                Ok(edits) => Box::new(rename_patches(edits)),
                Err(err) => Box::new(std::iter::once(Err(err))),
            };
            boxed
        });

        PatchStream::new(std::iter::once(Ok(empty_edit_map_patch())).chain(edits))
    }

    // =========================================================================
    // Document lifecycle
    // =========================================================================

    /// The client opened a document; publish its diagnostics after the
    /// debounce delay.
    pub fn text_document_did_open(&self, params: &DidOpenTextDocumentParams) {
        let uri = normalize_uri(&params.text_document.uri);
        if let Err(err) = self.projects.ensure_referenced_files(&uri) {
            warn!(%uri, %err, "could not ensure referenced files on open");
        }
        self.projects.did_open(&uri, &params.text_document.text);
        std::thread::sleep(self.options.diagnostics_debounce);
        self.publish_diagnostics(&uri);
    }

    /// The client changed a document. Only full-document sync is
    /// supported, as advertised at initialize.
    pub fn text_document_did_change(&self, params: &DidChangeTextDocumentParams) -> Result<()> {
        let uri = normalize_uri(&params.text_document.uri);
        let mut text = None;
        for change in &params.content_changes {
            if change.range.is_some() || change.range_length.is_some() {
                return Err(Error::precondition(format!(
                    "incremental updates in textDocument/didChange not supported for file {uri}"
                )));
            }
            text = Some(change.text.as_str());
        }
        let Some(text) = text else {
            return Ok(());
        };
        self.projects.did_change(&uri, text);
        std::thread::sleep(self.options.diagnostics_debounce);
        self.publish_diagnostics(&uri);
        Ok(())
    }

    /// The client saved a document.
    pub fn text_document_did_save(&self, params: &DidSaveTextDocumentParams) {
        let uri = normalize_uri(&params.text_document.uri);
        if let Err(err) = self.projects.ensure_referenced_files(&uri) {
            warn!(%uri, %err, "could not ensure referenced files on save");
        }
        self.projects.did_save(&uri);
    }

    /// The client closed a document; its diagnostics are cleared.
    pub fn text_document_did_close(&self, params: &DidCloseTextDocumentParams) {
        let uri = normalize_uri(&params.text_document.uri);
        self.projects.did_close(&uri);
        self.client.publish_diagnostics(PublishDiagnosticsParams {
            uri,
            diagnostics: Vec::new(),
        });
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn workspace_lock(&self) -> std::sync::MutexGuard<'_, Option<WorkspaceState>> {
        self.workspace.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn settings_lock(&self) -> std::sync::MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn memo_lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<Vec<PatchOp>>>> {
        self.empty_query_symbols
            .lock()
            .unwrap_or_else(|err| err.into_inner())
    }

    /// Snapshot of the workspace state, taken at the start of a request.
    fn workspace_state(&self) -> Result<WorkspaceState> {
        self.workspace_lock()
            .clone()
            .ok_or_else(|| Error::precondition("session has no initialized workspace"))
    }

    /// Snapshot of the format settings, taken at the start of a request.
    fn format_settings(&self) -> FormatCodeSettings {
        self.settings_lock().format.clone()
    }

    /// The configuration owning a position request's document, with its
    /// basic files ensured, plus the document itself.
    fn position_context(
        &self,
        uri: &str,
    ) -> Result<(Arc<dyn ProjectConfiguration>, Arc<SourceFile>, String)> {
        self.projects.ensure_referenced_files(uri)?;
        let file_path = uri_to_path(uri);
        let configuration = self.projects.configuration_for(&file_path)?;
        configuration.ensure_basic_files()?;
        let source = configuration
            .source_file(&file_path)
            .ok_or_else(|| Error::precondition(format!("unknown text document {uri}")))?;
        Ok((configuration, source, file_path))
    }

    fn definition_locations(&self, params: &TextDocumentPositionParams) -> Result<Vec<Location>> {
        let uri = normalize_uri(&params.text_document.uri);
        let (configuration, source, file_path) = self.position_context(&uri)?;
        let offset = source
            .offset_at(params.position)
            .ok_or_else(|| Error::precondition(format!("position out of range in {uri}")))?;

        let definitions = configuration.analyzer().definitions_at(&file_path, offset)?;
        definitions
            .into_iter()
            .map(|definition| {
                let source = configuration
                    .source_file(&definition.file_name)
                    .ok_or_else(|| {
                        Error::precondition(format!(
                            "expected source file {} to exist in configuration",
                            definition.file_name
                        ))
                    })?;
                Ok(Location::new(
                    location_uri(&definition.file_name),
                    source.range_of(definition.text_span.start, definition.text_span.end()),
                ))
            })
            .collect()
    }

    fn symbol_location_informations(
        &self,
        params: &TextDocumentPositionParams,
    ) -> Result<Vec<SymbolLocationInformation>> {
        let state = self.workspace_state()?;
        let uri = normalize_uri(&params.text_document.uri);
        let (configuration, source, file_path) = self.position_context(&uri)?;
        let offset = source
            .offset_at(params.position)
            .ok_or_else(|| Error::precondition(format!("position out of range in {uri}")))?;

        let definitions = configuration.analyzer().definitions_at(&file_path, offset)?;
        definitions
            .into_iter()
            .map(|definition| {
                let mut symbol = definition_to_descriptor(&definition, &state.root_path);
                let definition_uri = location_uri(&definition.file_name);
                if let Some(package) = self.resolver.resolve_package(&definition_uri) {
                    symbol.package = Some(package);
                }
                let source = configuration
                    .source_file(&definition.file_name)
                    .ok_or_else(|| {
                        Error::precondition(format!(
                            "expected source file {} to exist in configuration",
                            definition.file_name
                        ))
                    })?;
                Ok(SymbolLocationInformation {
                    symbol,
                    location: Some(Location::new(
                        definition_uri,
                        source.range_of(definition.text_span.start, definition.text_span.end()),
                    )),
                })
            })
            .collect()
    }

    fn hover(&self, params: &TextDocumentPositionParams) -> Result<Hover> {
        let uri = normalize_uri(&params.text_document.uri);
        let (configuration, source, file_path) = self.position_context(&uri)?;
        let offset = source
            .offset_at(params.position)
            .ok_or_else(|| Error::precondition(format!("position out of range in {uri}")))?;

        Ok(match configuration.analyzer().quick_info_at(&file_path, offset) {
            Some(info) => hover_from_quick_info(&info, &source),
            None => Hover::empty(),
        })
    }

    fn reference_locations(&self, params: &ReferenceParams) -> Result<Vec<Location>> {
        let uri = normalize_uri(&params.text_document.uri);
        // All own files are needed to collect all references
        self.projects.ensure_own_files()?;
        let file_path = uri_to_path(&uri);
        let configuration = self.projects.configuration_for(&file_path)?;
        configuration.ensure_all_files()?;
        let source = configuration
            .source_file(&file_path)
            .ok_or_else(|| Error::precondition(format!("unknown text document {uri}")))?;
        let offset = source
            .offset_at(params.position)
            .ok_or_else(|| Error::precondition(format!("position out of range in {uri}")))?;

        let include_declaration = params
            .context
            .as_ref()
            .is_some_and(|context| context.include_declaration);

        configuration
            .analyzer()
            .references_at(&file_path, offset)
            .into_iter()
            .filter(|reference| {
                (!reference.is_definition || include_declaration)
                    && !reference.file_name.contains("/node_modules/")
            })
            .map(|reference| {
                let source = configuration
                    .source_file(&reference.file_name)
                    .ok_or_else(|| {
                        Error::precondition(format!(
                            "source file {} does not exist",
                            reference.file_name
                        ))
                    })?;
                Ok(Location::new(
                    path_to_uri(&reference.file_name),
                    source.range_of(reference.text_span.start, reference.text_span.end()),
                ))
            })
            .collect()
    }

    fn document_symbols(&self, uri: &str) -> Result<Vec<crate::symbols::SymbolInformation>> {
        let uri = normalize_uri(uri);
        self.projects.ensure_referenced_files(&uri)?;
        let file_path = uri_to_path(&uri);
        let configuration = self.projects.configuration_for(&file_path)?;
        configuration.ensure_basic_files()?;
        let Some(source) = configuration.source_file(&file_path) else {
            return Ok(Vec::new());
        };
        let tree = configuration.analyzer().navigation_tree(&file_path)?;
        Ok(walk_navigation_tree(&tree)
            .into_iter()
            .filter(|node| navigation_tree_is_symbol(node.tree))
            .filter_map(|node| {
                navigation_tree_to_symbol_information(node.tree, node.parent, &source)
            })
            .collect())
    }

    /// Search scope for a DefinitelyTyped workspace: the query must name an
    /// `@types/` package, and only that package's subtree is searched.
    fn definitely_typed_search_scope(
        &self,
        state: &WorkspaceState,
        query: Option<Query>,
    ) -> Result<(Vec<Arc<dyn ProjectConfiguration>>, Option<String>, Option<Query>)> {
        let Some(Query::Structured(symbol)) = &query else {
            return Err(Error::unsupported(
                "workspace/symbol on DefinitelyTyped requires a SymbolDescriptor query \
                 with an @types PackageDescriptor",
            ));
        };
        let Some(package_name) = symbol.package_name().filter(|n| n.starts_with(TYPES_NAMESPACE))
        else {
            return Err(Error::unsupported(
                "workspace/symbol on DefinitelyTyped requires a SymbolDescriptor query \
                 with an @types PackageDescriptor",
            ));
        };

        // All packages live in the types/ subdirectory; "@types/foo" maps
        // to "<root>/types/foo/"
        let package_root_uri = format!("{}{}/", state.root_uri, &package_name[1..]);

        self.overlay.ensure_structure()?;
        for uri in self.overlay.uris() {
            if !uri.starts_with(&package_root_uri) {
                continue;
            }
            if let Err(err) = self.overlay.ensure(&uri) {
                warn!(%uri, %err, "could not fetch package file");
            }
        }

        let configuration = self
            .projects
            .parent_configuration(&package_root_uri)
            .ok_or_else(|| {
                Error::precondition(format!("could not find configuration for {package_root_uri}"))
            })?;

        // Don't match the package on the symbols themselves
        let query = Query::Structured(symbol.without_package());
        Ok((
            vec![configuration],
            Some(uri_to_path(&package_root_uri)),
            Some(query),
        ))
    }

    /// Search scope for a regular workspace: boundaries below a matching
    /// manifest when the query names a package, every boundary otherwise.
    fn regular_search_scope(
        &self,
        query: Option<Query>,
    ) -> Result<(Vec<Arc<dyn ProjectConfiguration>>, Option<String>, Option<Query>)> {
        self.projects.ensure_own_files()?;

        let package_name = match &query {
            Some(Query::Structured(symbol)) => symbol.package_name(),
            _ => None,
        };
        let configurations = match package_name {
            Some(package_name) => self.configurations_below_package(package_name),
            None => self.projects.configurations(),
        };
        Ok((configurations, None, query))
    }

    /// Boundaries rooted at or below the manifests whose package name
    /// matches.
    fn configurations_below_package(
        &self,
        package_name: &str,
    ) -> Vec<Arc<dyn ProjectConfiguration>> {
        let mut configurations = Vec::new();
        for manifest_uri in self.packages.package_json_uris() {
            let matches = match self.packages.package_json(&manifest_uri) {
                Ok(manifest) => manifest.name.as_deref() == Some(package_name),
                Err(err) => {
                    warn!(uri = %manifest_uri, %err, "unreadable manifest during search");
                    false
                }
            };
            if !matches {
                continue;
            }
            if let Some(parent) = self.projects.parent_configuration(&manifest_uri) {
                configurations.push(parent);
            }
            if let Some(directory) = manifest_directory(&manifest_uri) {
                configurations.extend(self.projects.child_configurations(&directory));
            }
        }
        configurations
    }

    /// The boundary owning the manifest with a package name; all
    /// boundaries when none matches.
    fn configurations_owning_package(
        &self,
        package_name: &str,
    ) -> Vec<Arc<dyn ProjectConfiguration>> {
        for manifest_uri in self.packages.package_json_uris() {
            let matches = match self.packages.package_json(&manifest_uri) {
                Ok(manifest) => manifest.name.as_deref() == Some(package_name),
                Err(_) => false,
            };
            if !matches {
                continue;
            }
            if let Some(configuration) = self.projects.parent_configuration(&manifest_uri) {
                return vec![configuration];
            }
            break;
        }
        self.projects.configurations()
    }

    /// Drain a cache-eligible search, memoize the patches, and replay them.
    /// A stream failing mid-way is returned as-is (prior patches plus the
    /// error) and not memoized.
    fn record_empty_query_stream(&self, stream: PatchStream) -> PatchStream {
        let mut recorded = Vec::new();
        for item in stream {
            match item {
                Ok(patch) => recorded.push(patch),
                Err(err) => {
                    return PatchStream::new(
                        recorded.into_iter().map(Ok).chain(std::iter::once(Err(err))),
                    );
                }
            }
        }
        let cached = Arc::new(recorded);
        *self.memo_lock() = Some(cached.clone());
        PatchStream::replay(cached)
    }

    /// `@types/` packages of a DefinitelyTyped workspace, one per `types/`
    /// subdirectory.
    fn definitely_typed_packages(
        &self,
        state: &WorkspaceState,
    ) -> Result<Vec<PackageInformation>> {
        self.overlay.ensure_structure()?;
        let types_uri = format!("{}types/", state.root_uri);
        let mut seen = rustc_hash::FxHashSet::default();
        let mut packages = Vec::new();
        for uri in self.overlay.uris() {
            let Some(rest) = uri.strip_prefix(&types_uri) else {
                continue;
            };
            let Some(directory) = rest.split('/').next().filter(|d| !d.is_empty()) else {
                continue;
            };
            let name = format!("{TYPES_NAMESPACE}{}", crate::uri::decode_component(directory));
            if !seen.insert(name.clone()) {
                continue;
            }
            packages.push(PackageInformation {
                package: PackageDescriptor {
                    name,
                    version: None,
                    repo_url: None,
                },
                dependencies: Vec::new(),
            });
        }
        Ok(packages)
    }

    /// PackageInformation for every own (non-dependency) manifest.
    fn own_package_informations(&self) -> Result<Vec<PackageInformation>> {
        self.projects.ensure_module_structure()?;
        let mut informations = Vec::new();
        for uri in self.overlay.uris() {
            if !uri.contains("/package.json") || uri.contains("/node_modules/") {
                continue;
            }
            let manifest = match self.packages.package_json(&uri) {
                Ok(manifest) => manifest,
                Err(err) => {
                    warn!(%uri, %err, "unreadable manifest");
                    continue;
                }
            };
            let Some(name) = manifest.name.clone() else {
                continue;
            };
            informations.push(PackageInformation {
                package: PackageDescriptor {
                    name,
                    version: manifest.version.clone(),
                    repo_url: manifest.repository_url().map(str::to_string),
                },
                dependencies: manifest.dependency_references(),
            });
        }
        Ok(informations)
    }

    fn completion_patches(&self, params: &TextDocumentPositionParams) -> Result<Vec<PatchOp>> {
        let uri = normalize_uri(&params.text_document.uri);
        let mut patches = vec![PatchOp::root(json!({ "isIncomplete": true, "items": [] }))];

        let (configuration, source, file_path) = self.position_context(&uri)?;
        let Some(offset) = source.offset_at(params.position) else {
            return Ok(patches);
        };
        let Some(entries) = configuration.analyzer().completions_at(&file_path, offset) else {
            return Ok(patches);
        };

        patches.push(PatchOp::add("/isIncomplete", json!(false)));
        for entry in entries {
            let item = CompletionItem {
                label: entry.name.clone(),
                kind: completion_kind(&entry.kind),
                sort_text: entry.sort_text,
                // Context for a future resolve request
                data: Some(to_json(&CompletionData {
                    uri: uri.clone(),
                    offset,
                    entry_name: entry.name,
                })),
                ..Default::default()
            };
            patches.push(PatchOp::add("/items/-", to_json(&item)));
        }
        Ok(patches)
    }

    fn resolve_completion_item(&self, mut item: CompletionItem) -> Result<CompletionItem> {
        let state = self.workspace_state()?;
        let data_value = item
            .data
            .take()
            .ok_or_else(|| Error::precondition("cannot resolve completion item without data"))?;
        let data: CompletionData = serde_json::from_value(data_value)
            .map_err(|err| Error::precondition(format!("malformed completion data: {err}")))?;

        let (configuration, _, file_path) = self.position_context(&data.uri)?;
        let details =
            configuration
                .analyzer()
                .completion_entry_details(&file_path, data.offset, &data.entry_name);
        if let Some(details) = details {
            item.documentation = Some(details.documentation);
            item.detail = Some(details.display_text);
            if state.supports_snippets && matches!(details.kind.as_str(), "method" | "function") {
                item.insert_text = Some(snippet_insert_text(&details.name, &details.parameter_names));
                item.insert_text_format = Some(InsertTextFormat::Snippet);
            } else {
                item.insert_text = Some(details.name);
                item.insert_text_format = Some(InsertTextFormat::PlainText);
            }
        }
        Ok(item)
    }

    fn signature_help(&self, params: &TextDocumentPositionParams) -> Result<SignatureHelp> {
        let uri = normalize_uri(&params.text_document.uri);
        let (configuration, source, file_path) = self.position_context(&uri)?;
        let offset = source
            .offset_at(params.position)
            .ok_or_else(|| Error::precondition(format!("position out of range in {uri}")))?;

        let Some(items) = configuration.analyzer().signature_help_at(&file_path, offset) else {
            return Ok(SignatureHelp {
                signatures: Vec::new(),
                active_signature: 0,
                active_parameter: 0,
            });
        };

        let signatures = items
            .items
            .into_iter()
            .map(|item| {
                let parameter_labels: Vec<&str> =
                    item.parameters.iter().map(|p| p.label.as_str()).collect();
                let label = format!(
                    "{}{}{}",
                    item.prefix,
                    parameter_labels.join(&item.separator),
                    item.suffix
                );
                SignatureInformation {
                    label,
                    documentation: if item.documentation.is_empty() {
                        None
                    } else {
                        Some(item.documentation)
                    },
                    parameters: item
                        .parameters
                        .into_iter()
                        .map(|parameter| ParameterInformation {
                            label: parameter.label,
                            documentation: if parameter.documentation.is_empty() {
                                None
                            } else {
                                Some(parameter.documentation)
                            },
                        })
                        .collect(),
                }
            })
            .collect();

        Ok(SignatureHelp {
            signatures,
            active_signature: items.selected_item_index,
            active_parameter: items.argument_index,
        })
    }

    fn code_actions(&self, params: &CodeActionParams) -> Result<Vec<Command>> {
        let uri = normalize_uri(&params.text_document.uri);
        self.projects.ensure_referenced_files(&uri)?;
        let configuration = self
            .projects
            .parent_configuration(&uri)
            .ok_or_else(|| Error::precondition(format!("could not find configuration for {uri}")))?;
        configuration.ensure_basic_files()?;
        let file_path = uri_to_path(&uri);
        let source = configuration
            .source_file(&file_path)
            .ok_or_else(|| Error::precondition(format!("unknown text document {uri}")))?;
        let start = source
            .offset_at(params.range.start)
            .ok_or_else(|| Error::precondition(format!("range out of bounds in {uri}")))?;
        let end = source
            .offset_at(params.range.end)
            .ok_or_else(|| Error::precondition(format!("range out of bounds in {uri}")))?;

        let error_codes: Vec<u32> = params
            .context
            .diagnostics
            .iter()
            .filter_map(|diagnostic| diagnostic.code)
            .collect();
        let format = self.format_settings();

        Ok(configuration
            .analyzer()
            .code_fixes_at(&file_path, start, end, &error_codes, &format)
            .into_iter()
            .map(|action| Command {
                title: action.description,
                command: "codeFix".to_string(),
                arguments: action.changes.iter().map(to_json).collect(),
            })
            .collect())
    }

    fn execute_code_fix(&self, changes: Vec<FileTextChanges>) -> Result<()> {
        if changes.is_empty() {
            return Err(Error::precondition("no changes supplied for code fix command"));
        }
        self.projects.ensure_own_files()?;
        let configuration = self.projects.configuration_for(&changes[0].file_name)?;
        configuration.ensure_basic_files()?;

        let mut edit = WorkspaceEdit::new();
        for change in &changes {
            let source = configuration
                .source_file(&change.file_name)
                .ok_or_else(|| {
                    Error::precondition(format!(
                        "expected source file {} to exist in configuration",
                        change.file_name
                    ))
                })?;
            let uri = path_to_uri(&change.file_name);
            for text_change in &change.text_changes {
                edit.add_edit(
                    uri.clone(),
                    TextEdit::new(
                        source.range_of(text_change.span.start, text_change.span.end()),
                        text_change.new_text.clone(),
                    ),
                );
            }
        }
        self.client.apply_workspace_edit(edit)
    }

    /// Compute and publish the diagnostics of one file. Quietly does
    /// nothing when the file has no owning configuration.
    fn publish_diagnostics(&self, uri: &str) {
        let Some(configuration) = self.projects.parent_configuration(uri) else {
            return;
        };
        let file_path = uri_to_path(uri);
        let Some(source) = configuration.source_file(&file_path) else {
            return;
        };
        let analyzer = configuration.analyzer();
        let mut engine_diagnostics = analyzer.syntactic_diagnostics(&file_path);
        engine_diagnostics.extend(analyzer.semantic_diagnostics(&file_path));

        let diagnostics = engine_diagnostics
            .iter()
            // Diagnostics without a file cannot be represented to the client
            .filter(|diagnostic| diagnostic.file.is_some())
            .map(|diagnostic| convert_diagnostic(diagnostic, &source))
            .collect();
        self.client.publish_diagnostics(PublishDiagnosticsParams {
            uri: uri.to_string(),
            diagnostics,
        });
    }
}

/// Directory URI containing a manifest URI.
fn manifest_directory(manifest_uri: &str) -> Option<String> {
    manifest_uri
        .rsplit_once('/')
        .map(|(directory, _)| format!("{directory}/"))
}
