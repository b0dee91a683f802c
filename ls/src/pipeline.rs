/*! Analysis pipeline.

The pipeline owns the state of every document: it parses and indexes new
versions, publishes a new workspace [`Snapshot`] after each one, invokes the
rule compiler once the document has been idle for a while, and publishes the
resulting diagnostics.

Each document goes through the following phases:

```text
Unanalyzed → Parsing → Indexed → Compiling → CompileComplete → Indexed
```

A new version of a document supersedes any pass that is still in flight for
the previous one. Superseded passes are cancelled, and if they finish anyway
their results are discarded, so diagnostics for an old version are never
published after diagnostics for a newer one.
 */

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_lsp::lsp_types::{FileChangeType, FileEvent, Url};
use dashmap::DashMap;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use yarals_parser::Span;

use crate::collaborators::{
    CompilerMessage, DiagnosticsSink, RuleCompiler, SourceText,
};
use crate::configuration::Config;
use crate::documents::document::Document;
use crate::documents::{walk_workspace, Diagnostic, Origin};
use crate::errors::{CompileError, RequestError};
use crate::features::diagnostics::to_lsp;
use crate::index::{DocumentIndex, Snapshot};

/// Analysis phase of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unanalyzed,
    Parsing,
    Indexed,
    Compiling,
    CompileComplete,
}

/// Diagnostics produced by the compiler for a specific version.
#[derive(Debug, Clone)]
struct CompileResult {
    version: Option<i32>,
    diagnostics: Vec<Diagnostic>,
}

/// State of a document open in the editor.
#[derive(Debug)]
struct DocumentState {
    /// Latest version received from the editor.
    version: Option<i32>,
    phase: Phase,
    /// Cancels the pass in flight for this document.
    cancel: Option<CancellationToken>,
    /// Version of the last diagnostics published.
    last_published: Option<i32>,
    compiled: Option<CompileResult>,
    /// False if the compiler was unavailable during the last pass.
    compiler_available: bool,
}

impl Default for DocumentState {
    fn default() -> Self {
        Self {
            version: None,
            phase: Phase::Unanalyzed,
            cancel: None,
            last_published: None,
            compiled: None,
            compiler_available: true,
        }
    }
}

pub struct Pipeline {
    snapshot: RwLock<Arc<Snapshot>>,
    /// Documents open in the editor. Documents read from the workspace
    /// folder are indexed, but don't have a state.
    states: DashMap<Url, DocumentState>,
    compiler: RwLock<Option<Arc<dyn RuleCompiler>>>,
    sink: Arc<dyn DiagnosticsSink>,
    config: RwLock<Config>,
    next_order: AtomicU64,
}

impl Pipeline {
    pub fn new(
        sink: Arc<dyn DiagnosticsSink>,
        compiler: Option<Arc<dyn RuleCompiler>>,
        config: Config,
    ) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            states: DashMap::new(),
            compiler: RwLock::new(compiler),
            sink,
            config: RwLock::new(config),
            next_order: AtomicU64::new(0),
        }
    }

    /// Returns the latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn generation(&self) -> u64 {
        self.snapshot.read().generation
    }

    /// Fails with [`RequestError::StaleSnapshot`] if a newer snapshot was
    /// published after `snapshot`.
    pub fn ensure_current(&self, snapshot: &Snapshot) -> Result<(), RequestError> {
        if self.generation() == snapshot.generation {
            Ok(())
        } else {
            Err(RequestError::StaleSnapshot)
        }
    }

    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    pub fn set_config(&self, config: Config) {
        *self.config.write() = config;
    }

    /// Replaces the compiler used by compilations started from now on.
    pub fn set_compiler(&self, compiler: Option<Arc<dyn RuleCompiler>>) {
        *self.compiler.write() = compiler;
    }

    fn compiler(&self) -> Option<Arc<dyn RuleCompiler>> {
        self.compiler.read().clone()
    }

    pub fn phase(&self, uri: &Url) -> Phase {
        if let Some(state) = self.states.get(uri) {
            return state.phase;
        }
        if self.snapshot.read().document(uri).is_some() {
            Phase::Indexed
        } else {
            Phase::Unanalyzed
        }
    }

    /// Returns false if the compiler was unavailable the last time the
    /// document was compiled.
    pub fn compiler_available(&self, uri: &Url) -> bool {
        self.states.get(uri).map_or(true, |state| state.compiler_available)
    }

    /// Returns the URIs of the documents open in the editor.
    pub fn open_documents(&self) -> Vec<Url> {
        self.states.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Handles a document that was opened or changed in the editor.
    ///
    /// Versions must be strictly increasing, a version that is not newer
    /// than the current one is ignored and the function returns false.
    pub fn open_or_change(
        self: &Arc<Self>,
        uri: Url,
        version: i32,
        text: String,
    ) -> bool {
        let Some(token) = self.begin_pass(&uri, Some(version), false) else {
            return false;
        };

        let order = self.order_of(&uri);
        let document = Document::parse(uri.clone(), Some(version), text);
        let index = DocumentIndex::new(document, order);

        if !self.commit(index) {
            return false;
        }

        self.after_commit(uri, Some(version), token, false);
        true
    }

    /// Handles a document that was saved.
    ///
    /// If the saved text differs from the current one it replaces it,
    /// keeping the same version.
    pub fn save(self: &Arc<Self>, uri: Url, text: Option<String>) {
        let Some(current) = self.snapshot().document(&uri).cloned() else {
            return;
        };

        let version = current.document.version;

        let Some(token) = self.begin_pass(&uri, version, true) else {
            return;
        };

        match text {
            Some(text) if *text != *current.document.text => {
                let document = Document::parse(uri.clone(), version, text);
                if !self.commit(DocumentIndex::new(document, current.order)) {
                    return;
                }
            }
            _ => self.set_phase(&uri, Phase::Indexed),
        }

        self.after_commit(uri, version, token, true);
    }

    /// Handles a document that was closed in the editor.
    ///
    /// If the workspace is cached the document is read again from disk,
    /// otherwise it's removed from the index.
    pub fn close(&self, uri: &Url) {
        if let Some((_, state)) = self.states.remove(uri) {
            if let Some(token) = state.cancel {
                token.cancel();
            }
        }

        let reloaded = if self.config.read().cache_workspace {
            self.read_from_disk(uri)
        } else {
            None
        };

        self.sink.publish(uri.clone(), None, Vec::new());

        self.update_snapshot(Some(uri), |snapshot| {
            Some(match reloaded {
                Some(index) => snapshot.with_document(index),
                None => snapshot.without_document(uri),
            })
        });
    }

    /// Indexes every YARA file in the workspace folder that is not open in
    /// the editor.
    pub fn cache_workspace(&self, root: &Path) {
        let indexes: Vec<_> = walk_workspace(root)
            .filter(|uri| !self.states.contains_key(uri))
            .filter_map(|uri| self.read_from_disk(&uri))
            .collect();

        info!("cached {} files from {}", indexes.len(), root.display());

        self.update_snapshot(None, |snapshot| {
            Some(snapshot.with_documents(indexes))
        });
    }

    /// Removes from the index every document that is not open in the
    /// editor.
    pub fn clear_cache(&self) {
        self.update_snapshot(None, |snapshot| {
            Some(snapshot.without_documents(|index| {
                !self.states.contains_key(index.uri())
            }))
        });
    }

    /// Updates cached documents after they changed on disk.
    pub fn watched_files_changed(&self, changes: Vec<FileEvent>) {
        if !self.config.read().cache_workspace {
            return;
        }
        for change in changes {
            // Open documents are synchronized by the editor.
            if self.states.contains_key(&change.uri) {
                continue;
            }
            match change.typ {
                FileChangeType::CREATED | FileChangeType::CHANGED => {
                    if let Some(index) = self.read_from_disk(&change.uri) {
                        self.update_snapshot(None, |snapshot| {
                            Some(snapshot.with_document(index))
                        });
                    }
                }
                FileChangeType::DELETED => {
                    self.update_snapshot(None, |snapshot| {
                        Some(snapshot.without_document(&change.uri))
                    });
                }
                _ => {}
            }
        }
    }

    /// Compiles a document right away, without waiting for the debounce
    /// delay.
    pub async fn compile_now(self: Arc<Self>, uri: Url) {
        let Some(version) = self.states.get(&uri).map(|state| state.version)
        else {
            return;
        };
        let Some(token) = self.begin_pass(&uri, version, true) else {
            return;
        };
        self.set_phase(&uri, Phase::Indexed);
        self.compile_pass(uri, version, token).await;
    }

    /// Compiles every document open in the editor.
    pub fn compile_all(self: &Arc<Self>) {
        for uri in self.open_documents() {
            tokio::spawn(Arc::clone(self).compile_now(uri));
        }
    }

    /// Returns the diagnostics for the current version of a document,
    /// including the compiler diagnostics if they are up to date.
    pub fn diagnostics(
        &self,
        uri: &Url,
    ) -> Result<Vec<async_lsp::lsp_types::Diagnostic>, RequestError> {
        let snapshot = self.snapshot();
        let index = snapshot.require(uri)?;
        let mut diagnostics =
            crate::features::diagnostics::diagnostics(&snapshot, uri)?;

        if let Some(state) = self.states.get(uri) {
            if let Some(compiled) = &state.compiled {
                if compiled.version == index.document.version {
                    diagnostics.extend(compiled.diagnostics.iter().cloned());
                }
            }
        }

        Ok(diagnostics
            .iter()
            .map(|diagnostic| to_lsp(&index.document, diagnostic))
            .collect())
    }

    /// Registers a new pass for the document, cancelling the previous one.
    ///
    /// Returns `None` if the version is older than the current one, or
    /// equal to it and `same_version` is false.
    fn begin_pass(
        &self,
        uri: &Url,
        version: Option<i32>,
        same_version: bool,
    ) -> Option<CancellationToken> {
        let mut state = self.states.entry(uri.clone()).or_default();

        if let (Some(new), Some(current)) = (version, state.version) {
            if new < current || (new == current && !same_version) {
                warn!(
                    "ignoring version {new} of {uri}, current version is {current}"
                );
                return None;
            }
        }

        let token = CancellationToken::new();

        if let Some(previous) = state.cancel.replace(token.clone()) {
            if !previous.is_cancelled() {
                debug!("pass for {uri} superseded by version {version:?}");
                previous.cancel();
            }
        }

        state.version = version;
        state.phase = Phase::Parsing;

        Some(token)
    }

    /// Publishes a new snapshot with the given index, unless a newer
    /// version of the document was received while it was being parsed.
    fn commit(&self, index: DocumentIndex) -> bool {
        let uri = index.uri().clone();
        let version = index.document.version;

        let committed = self.update_snapshot(Some(&uri), |snapshot| {
            if !self.is_current(&uri, version) {
                debug!("discarding superseded version {version:?} of {uri}");
                return None;
            }
            Some(snapshot.with_document(Arc::new(index)))
        });

        if committed {
            self.set_phase(&uri, Phase::Indexed);
        }

        committed
    }

    /// Publishes the snapshot that `update` derives from the current one.
    /// If `update` returns `None` the current snapshot is kept and the
    /// function returns false.
    ///
    /// A document can gain or lose duplicate rule diagnostics because of
    /// changes in other documents. Those diagnostics are published again
    /// for every open document where they changed, except `changed`, which
    /// is published by its own pass.
    fn update_snapshot(
        &self,
        changed: Option<&Url>,
        update: impl FnOnce(&Snapshot) -> Option<Snapshot>,
    ) -> bool {
        let (old, new) = {
            let mut snapshot = self.snapshot.write();
            let Some(new) = update(&snapshot) else {
                return false;
            };
            let new = Arc::new(new);
            (std::mem::replace(&mut *snapshot, Arc::clone(&new)), new)
        };

        for uri in self.open_documents() {
            if Some(&uri) == changed || old.conflicts(&uri) == new.conflicts(&uri) {
                continue;
            }
            debug!("duplicate rules in {uri} changed");
            self.republish(&uri);
        }

        true
    }

    /// Publishes the diagnostics of the current version of a document
    /// again, including the compiler diagnostics if they are up to date.
    fn republish(&self, uri: &Url) {
        let Some((version, compiled)) = self.states.get(uri).map(|state| {
            let compiled = state
                .compiled
                .as_ref()
                .filter(|compiled| compiled.version == state.version)
                .map(|compiled| compiled.diagnostics.clone());
            (state.version, compiled)
        }) else {
            return;
        };
        self.publish(uri, version, compiled);
    }

    /// Schedules the compilation of a committed version, or publishes its
    /// diagnostics right away if no compilation is needed.
    fn after_commit(
        self: &Arc<Self>,
        uri: Url,
        version: Option<i32>,
        token: CancellationToken,
        saved: bool,
    ) {
        let config = self.config();

        let delay = match (saved, self.compiler().is_some()) {
            (_, false) => None,
            (true, true) if config.compile_on_save => Some(Duration::ZERO),
            (false, true) if config.compile_on_change => Some(config.debounce()),
            _ => None,
        };

        let Some(delay) = delay else {
            self.publish(&uri, version, None);
            return;
        };

        let pipeline = Arc::clone(self);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("compilation of {uri} cancelled before starting");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            pipeline.compile_pass(uri, version, token).await;
        });
    }

    /// Compiles the document and publishes its diagnostics.
    async fn compile_pass(
        &self,
        uri: Url,
        version: Option<i32>,
        token: CancellationToken,
    ) {
        let Some(compiler) = self.compiler() else {
            self.publish(&uri, version, None);
            return;
        };

        let snapshot = self.snapshot();

        let Some(index) = snapshot.document(&uri).cloned() else {
            return;
        };

        if index.document.version != version {
            return;
        }

        self.set_phase(&uri, Phase::Compiling);

        let mut files = vec![SourceText {
            uri: uri.clone(),
            text: Arc::clone(&index.document.text),
        }];

        files.extend(snapshot.documents().into_iter().filter(|i| i.uri() != &uri).map(
            |i| SourceText {
                uri: i.uri().clone(),
                text: Arc::clone(&i.document.text),
            },
        ));

        let result = tokio::select! {
            _ = token.cancelled() => {
                debug!("compilation of {uri} superseded");
                return;
            }
            result = compiler.compile(files) => result,
        };

        if token.is_cancelled() || !self.is_current(&uri, version) {
            debug!("discarding compilation of superseded version of {uri}");
            return;
        }

        let diagnostics = match result {
            Ok(messages) => Some(
                messages
                    .into_iter()
                    .filter(|message| message.file == uri)
                    .map(|message| compiler_diagnostic(&index.document, message))
                    .collect::<Vec<_>>(),
            ),
            Err(CompileError::Unavailable) => {
                info!("rule compiler unavailable, {uri} has syntax diagnostics only");
                None
            }
            Err(err) => {
                error!("compilation of {uri} failed: {err}");
                None
            }
        };

        if let Some(mut state) = self.states.get_mut(&uri) {
            state.phase = Phase::CompileComplete;
            state.compiler_available = diagnostics.is_some();
            state.compiled = diagnostics.clone().map(|diagnostics| {
                CompileResult { version, diagnostics }
            });
        }

        self.publish(&uri, version, diagnostics);
        self.set_phase(&uri, Phase::Indexed);
    }

    /// Publishes the diagnostics for a version of a document, unless the
    /// version was superseded or newer diagnostics were already published.
    fn publish(
        &self,
        uri: &Url,
        version: Option<i32>,
        compiled: Option<Vec<Diagnostic>>,
    ) {
        let snapshot = self.snapshot();

        let Some(index) = snapshot.document(uri) else {
            return;
        };

        if index.document.version != version {
            return;
        }

        let Ok(mut diagnostics) = crate::features::diagnostics::diagnostics(&snapshot, uri) else {
            return;
        };
        diagnostics.extend(compiled.unwrap_or_default());

        let diagnostics = diagnostics
            .iter()
            .map(|diagnostic| to_lsp(&index.document, diagnostic))
            .collect();

        // The state is locked while publishing, so that passes for the
        // same document can't publish out of order.
        let Some(mut state) = self.states.get_mut(uri) else {
            return;
        };

        if state.version != version || state.last_published > version {
            debug!("dropping diagnostics for superseded version of {uri}");
            return;
        }

        state.last_published = version;
        self.sink.publish(uri.clone(), version, diagnostics);
    }

    fn is_current(&self, uri: &Url, version: Option<i32>) -> bool {
        self.states.get(uri).is_some_and(|state| state.version == version)
    }

    fn set_phase(&self, uri: &Url, phase: Phase) {
        if let Some(mut state) = self.states.get_mut(uri) {
            state.phase = phase;
        }
    }

    /// Returns the registration order of a document, allocating a new one
    /// if the document is not indexed yet.
    fn order_of(&self, uri: &Url) -> u64 {
        let existing = self.snapshot.read().document(uri).map(|index| index.order);
        existing.unwrap_or_else(|| self.next_order.fetch_add(1, Ordering::Relaxed))
    }

    fn read_from_disk(&self, uri: &Url) -> Option<Arc<DocumentIndex>> {
        let path = uri.to_file_path().ok()?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!("can't read {}: {err}", path.display());
                return None;
            }
        };
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let document = Document::parse(uri.clone(), None, text);
        Some(Arc::new(DocumentIndex::new(document, self.order_of(uri))))
    }
}

/// Converts a message from the compiler into a diagnostic. The diagnostic
/// covers the line reported by the compiler, from its first non-blank
/// character to its end.
fn compiler_diagnostic(document: &Document, message: CompilerMessage) -> Diagnostic {
    let lines = &document.line_index;
    let line = (message.line.max(1) - 1) as usize;
    let line = line.min(lines.line_count() - 1);
    let span = lines.line_span(line).unwrap_or_default();
    let text = document.text_at(span);
    let indent = text.len() - text.trim_start().len();

    Diagnostic {
        severity: message.severity,
        message: message.message,
        span: Span::new(span.start() + indent, span.end()),
        origin: Origin::Compile,
        code: None,
    }
}
