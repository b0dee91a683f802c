/*! This module implements [Language Server Protocol (LSP)][1] for YARA.

By implementing the [`async_lsp::LanguageServer`] trait for
[`YARALanguageServer`], it defines how the server should process various
LSP requests and notifications.

Notifications that modify documents are forwarded to the [`Pipeline`].
Requests are answered by the functions in [`crate::features`], using the
latest snapshot published by the pipeline.

[1]: https://microsoft.github.io/language-server-protocol/
 */

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use async_lsp::lsp_types::{
    CompletionOptions, CompletionParams, CompletionResponse,
    ConfigurationItem, ConfigurationParams, DiagnosticOptions,
    DiagnosticServerCapabilities, DidChangeConfigurationParams,
    DidChangeTextDocumentParams, DidChangeWatchedFilesParams,
    DidChangeWatchedFilesRegistrationOptions, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DidSaveTextDocumentParams,
    DocumentDiagnosticParams, DocumentDiagnosticReport,
    DocumentDiagnosticReportResult, DocumentFormattingParams,
    DocumentHighlight, DocumentHighlightParams, ExecuteCommandOptions,
    ExecuteCommandParams, FileSystemWatcher, FullDocumentDiagnosticReport,
    GlobPattern, GotoDefinitionParams, GotoDefinitionResponse, Hover,
    HoverParams, HoverProviderCapability, InitializeParams, InitializeResult,
    InitializedParams, Location, MessageType, OneOf, ReferenceParams,
    Registration, RegistrationParams, RelatedFullDocumentDiagnosticReport,
    RenameParams, SaveOptions, ServerCapabilities, ServerInfo,
    ShowMessageParams, TextDocumentSyncCapability, TextDocumentSyncKind,
    TextDocumentSyncOptions, TextDocumentSyncSaveOptions, TextEdit,
    Unregistration, UnregistrationParams, Url, WatchKind, WorkspaceEdit,
};
use async_lsp::router::Router;
use async_lsp::{
    ClientSocket, ErrorCode, LanguageClient, LanguageServer, ResponseError,
};
use futures::future::BoxFuture;
use log::{info, warn};
use serde_json::{from_value, to_value, Value};

use crate::collaborators::{ClientSink, ExternalCompiler};
use crate::configuration::Config;
use crate::features::completion::completion;
use crate::features::document_highlight::document_highlight;
use crate::features::formatting::{
    formatting, CanonicalFormatter, RuleFormatter,
};
use crate::features::goto::go_to_definition;
use crate::features::hover::hover;
use crate::features::references::find_references;
use crate::features::rename::rename;
use crate::pipeline::Pipeline;

/// Compiles the document passed as argument right away.
pub const COMPILE_RULE_COMMAND: &str = "yara.CompileRule";

/// Compiles every document open in the editor right away.
pub const COMPILE_ALL_RULES_COMMAND: &str = "yara.CompileAllRules";

const WATCHED_FILES_ID: &str = "yarals/watchedFiles";

/// Represents a YARA language server.
pub struct YARALanguageServer {
    /// Client socket for communication with the Development Tool.
    ///
    /// Mainly used to send notifications such as diagnostics updates,
    /// logging and showing messages, etc.
    client: ClientSocket,

    /// Publishes the diagnostics produced by the pipeline.
    sink: Arc<ClientSink>,

    /// Owns the documents and the symbol index.
    pipeline: Arc<Pipeline>,

    formatter: Arc<dyn RuleFormatter>,

    /// Root of the first workspace folder, if any.
    workspace: Option<PathBuf>,
}

/// Implements document synchronization and various LSP features.
///
/// The features themselves are implemented in [`crate::features`] module,
/// this trait is responsible for routing the request to the appropriate
/// feature.
impl LanguageServer for YARALanguageServer {
    type Error = ResponseError;
    type NotifyResult = ControlFlow<async_lsp::Result<()>>;

    /// This method is called when the language server is initializing.
    ///
    /// It sets up the server's capabilities and reads the configuration
    /// passed in `initializationOptions`. If the client supports pull model
    /// diagnostics, diagnostics are not pushed with notifications.
    fn initialize(
        &mut self,
        params: InitializeParams,
    ) -> BoxFuture<'static, Result<InitializeResult, Self::Error>> {
        let pull_diagnostics = params
            .capabilities
            .text_document
            .and_then(|c| c.diagnostic)
            .is_some();

        self.sink.set_push(!pull_diagnostics);

        self.workspace = params
            .workspace_folders
            .and_then(|folders| folders.first().cloned())
            .and_then(|folder| folder.uri.to_file_path().ok());

        let config = params
            .initialization_options
            .and_then(|value| from_value::<Config>(value).ok())
            .unwrap_or_default();

        // No document is open yet, so the pipeline can be replaced with
        // one that uses the configured compiler.
        self.pipeline = Arc::new(Pipeline::new(
            self.sink.clone(),
            Some(Arc::new(ExternalCompiler::new(config.compiler_path.clone()))),
            config,
        ));

        Box::pin(async move {
            Ok(InitializeResult {
                capabilities: ServerCapabilities {
                    hover_provider: Some(HoverProviderCapability::Simple(true)),
                    definition_provider: Some(OneOf::Left(true)),
                    references_provider: Some(OneOf::Left(true)),
                    document_formatting_provider: Some(OneOf::Left(true)),
                    completion_provider: Some(CompletionOptions {
                        resolve_provider: Some(false),
                        trigger_characters: Some(vec![
                            ".".to_string(),
                            "!".to_string(),
                            "$".to_string(),
                            "@".to_string(),
                            "#".to_string(),
                            "[".to_string(),
                            "\"".to_string(),
                        ]),
                        ..Default::default()
                    }),
                    document_highlight_provider: Some(OneOf::Left(true)),
                    rename_provider: Some(OneOf::Left(true)),
                    execute_command_provider: Some(ExecuteCommandOptions {
                        commands: vec![
                            COMPILE_RULE_COMMAND.to_string(),
                            COMPILE_ALL_RULES_COMMAND.to_string(),
                        ],
                        ..Default::default()
                    }),
                    text_document_sync: Some(
                        TextDocumentSyncCapability::Options(
                            TextDocumentSyncOptions {
                                save: Some(
                                    TextDocumentSyncSaveOptions::SaveOptions(
                                        SaveOptions {
                                            include_text: Some(true),
                                        },
                                    ),
                                ),
                                open_close: Some(true),
                                change: Some(TextDocumentSyncKind::FULL),
                                ..Default::default()
                            },
                        ),
                    ),
                    // This is for pull model diagnostics
                    diagnostic_provider: Some(
                        DiagnosticServerCapabilities::Options(
                            DiagnosticOptions::default(),
                        ),
                    ),
                    ..ServerCapabilities::default()
                },
                server_info: Some(ServerInfo {
                    name: env!("CARGO_PKG_NAME").to_string(),
                    version: Some(env!("CARGO_PKG_VERSION").to_string()),
                }),
            })
        })
    }

    /// This method is called when the communication between the language
    /// server and the code editor is considered initialized.
    ///
    /// After the communication is initialized, the server can dynamically
    /// register capabilities. In this case, the language server wants to
    /// get notifications about configuration changes via
    /// `workspace/didChangeConfiguration`.
    fn initialized(
        &mut self,
        _params: InitializedParams,
    ) -> Self::NotifyResult {
        let mut client = self.client.clone();
        tokio::spawn(async move {
            let _ = client
                .register_capability(RegistrationParams {
                    registrations: vec![Registration {
                        id: "yarals/didChangeConfiguration".to_string(),
                        method: "workspace/didChangeConfiguration".to_string(),
                        register_options: None,
                    }],
                })
                .await;
        });

        // The workspace is cached only after the communication is
        // considered initialized, even if the option was passed in the
        // `initialize` request.
        if self.pipeline.config().cache_workspace {
            self.start_caching();
        }

        ControlFlow::Continue(())
    }

    /// This method is called when the user hovers over a symbol.
    ///
    /// It provides information about the symbol, such as its type and
    /// documentation, which is displayed as a tooltip in the editor.
    fn hover(
        &mut self,
        params: HoverParams,
    ) -> BoxFuture<'static, Result<Option<Hover>, Self::Error>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let pipeline = Arc::clone(&self.pipeline);

        Box::pin(async move {
            let snapshot = pipeline.snapshot();
            Ok(hover(&snapshot, &uri, position)?
                .map(|contents| Hover { contents, range: None }))
        })
    }

    /// This method is called when the user requests to go to the definition
    /// of a symbol.
    ///
    /// It returns the location of the symbol's definition, allowing the
    /// editor to navigate to it.
    fn definition(
        &mut self,
        params: GotoDefinitionParams,
    ) -> BoxFuture<'static, Result<Option<GotoDefinitionResponse>, Self::Error>>
    {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let pipeline = Arc::clone(&self.pipeline);

        Box::pin(async move {
            let snapshot = pipeline.snapshot();
            Ok(go_to_definition(&snapshot, &uri, position)?
                .map(GotoDefinitionResponse::Scalar))
        })
    }

    /// This method is called when the user requests to find all references
    /// to a symbol.
    ///
    /// It returns a list of all locations where the symbol is used,
    /// allowing the editor to display them.
    fn references(
        &mut self,
        params: ReferenceParams,
    ) -> BoxFuture<'static, Result<Option<Vec<Location>>, Self::Error>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let include_declaration = params.context.include_declaration;
        let pipeline = Arc::clone(&self.pipeline);

        Box::pin(async move {
            let snapshot = pipeline.snapshot();
            Ok(find_references(&snapshot, &uri, position, include_declaration)?)
        })
    }

    /// This method is called when the user requests code completion.
    ///
    /// It provides a list of suggested completions for the current cursor
    /// position, such as keywords, identifiers, and module members. The
    /// suggestions are triggered by characters like `.`, `!`, `$`, `@`, and
    /// `#`.
    fn completion(
        &mut self,
        params: CompletionParams,
    ) -> BoxFuture<'static, Result<Option<CompletionResponse>, Self::Error>>
    {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let pipeline = Arc::clone(&self.pipeline);

        Box::pin(async move {
            let snapshot = pipeline.snapshot();
            Ok(completion(&snapshot, &uri, position)?
                .map(CompletionResponse::Array))
        })
    }

    /// This method is called when the user requests to highlight occurrences
    /// of a symbol in the document.
    fn document_highlight(
        &mut self,
        params: DocumentHighlightParams,
    ) -> BoxFuture<'static, Result<Option<Vec<DocumentHighlight>>, Self::Error>>
    {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let pipeline = Arc::clone(&self.pipeline);

        Box::pin(async move {
            let snapshot = pipeline.snapshot();
            Ok(document_highlight(&snapshot, &uri, position)?)
        })
    }

    /// This method is called when the user wants to rename a symbol.
    ///
    /// The edits are computed against a single snapshot. If a new snapshot
    /// was published in the meantime the request fails with
    /// `ContentModified`, and the client can retry it.
    fn rename(
        &mut self,
        params: RenameParams,
    ) -> BoxFuture<'static, Result<Option<WorkspaceEdit>, Self::Error>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let new_name = params.new_name;
        let pipeline = Arc::clone(&self.pipeline);

        Box::pin(async move {
            let snapshot = pipeline.snapshot();
            let edit = rename(&snapshot, &uri, position, &new_name)?;
            pipeline.ensure_current(&snapshot)?;
            Ok(edit)
        })
    }

    /// This method is called to provide diagnostic information for a document.
    ///
    /// It is only called if the client supports the pull model for
    /// diagnostics.
    fn document_diagnostic(
        &mut self,
        params: DocumentDiagnosticParams,
    ) -> BoxFuture<'static, Result<DocumentDiagnosticReportResult, Self::Error>>
    {
        let uri = params.text_document.uri;
        let pipeline = Arc::clone(&self.pipeline);

        Box::pin(async move {
            Ok(DocumentDiagnosticReportResult::Report(
                DocumentDiagnosticReport::Full(
                    RelatedFullDocumentDiagnosticReport {
                        full_document_diagnostic_report:
                            FullDocumentDiagnosticReport {
                                result_id: None,
                                items: pipeline.diagnostics(&uri)?,
                            },
                        related_documents: None,
                    },
                ),
            ))
        })
    }

    /// It formats the source code and returns a single edit that replaces
    /// the whole document.
    fn formatting(
        &mut self,
        params: DocumentFormattingParams,
    ) -> BoxFuture<'static, Result<Option<Vec<TextEdit>>, Self::Error>> {
        let pipeline = Arc::clone(&self.pipeline);
        let formatter = Arc::clone(&self.formatter);

        Box::pin(async move {
            let snapshot = pipeline.snapshot();
            Ok(formatting(
                &snapshot,
                &params.text_document.uri,
                &params.options,
                formatter.as_ref(),
            )?)
        })
    }

    /// Runs one of the commands listed in the `executeCommandProvider`
    /// capability.
    fn execute_command(
        &mut self,
        params: ExecuteCommandParams,
    ) -> BoxFuture<'static, Result<Option<Value>, Self::Error>> {
        let pipeline = Arc::clone(&self.pipeline);

        Box::pin(async move {
            match params.command.as_str() {
                COMPILE_RULE_COMMAND => {
                    let uri = params
                        .arguments
                        .into_iter()
                        .next()
                        .and_then(|arg| from_value::<Url>(arg).ok())
                        .ok_or_else(|| {
                            ResponseError::new(
                                ErrorCode::INVALID_PARAMS,
                                format!(
                                    "{COMPILE_RULE_COMMAND} expects a document URI"
                                ),
                            )
                        })?;
                    pipeline.compile_now(uri).await;
                    Ok(None)
                }
                COMPILE_ALL_RULES_COMMAND => {
                    pipeline.compile_all();
                    Ok(None)
                }
                command => Err(ResponseError::new(
                    ErrorCode::INVALID_PARAMS,
                    format!("unknown command `{command}`"),
                )),
            }
        })
    }

    /// This method is called when a document is opened.
    fn did_open(
        &mut self,
        params: DidOpenTextDocumentParams,
    ) -> Self::NotifyResult {
        let document = params.text_document;
        self.pipeline.open_or_change(
            document.uri,
            document.version,
            document.text,
        );
        ControlFlow::Continue(())
    }

    /// This method is called when a document is saved.
    fn did_save(
        &mut self,
        params: DidSaveTextDocumentParams,
    ) -> Self::NotifyResult {
        self.pipeline.save(params.text_document.uri, params.text);
        ControlFlow::Continue(())
    }

    /// This method is called when a document is changed.
    ///
    /// Documents are synchronized in full, so only the last change matters.
    fn did_change(
        &mut self,
        params: DidChangeTextDocumentParams,
    ) -> Self::NotifyResult {
        if let Some(change) = params.content_changes.into_iter().last() {
            self.pipeline.open_or_change(
                params.text_document.uri,
                params.text_document.version,
                change.text,
            );
        }
        ControlFlow::Continue(())
    }

    /// This method is called when a document is closed.
    fn did_close(
        &mut self,
        params: DidCloseTextDocumentParams,
    ) -> Self::NotifyResult {
        self.pipeline.close(&params.text_document.uri);
        ControlFlow::Continue(())
    }

    /// This method is called right when the client changes its
    /// configuration.
    ///
    /// This represents push model, which is currently considered
    /// deprecated method for obtaining configuration. Therefore, this
    /// method is only used to receive notifications about changes, and
    /// the configuration itself is obtained using a pull model.
    fn did_change_configuration(
        &mut self,
        _params: DidChangeConfigurationParams,
    ) -> Self::NotifyResult {
        self.load_config();
        ControlFlow::Continue(())
    }

    fn did_change_watched_files(
        &mut self,
        params: DidChangeWatchedFilesParams,
    ) -> Self::NotifyResult {
        self.pipeline.watched_files_changed(params.changes);
        ControlFlow::Continue(())
    }

    /// This method is called when the server is requested to shut down.
    ///
    /// It should not exit the process, but instead, it should prepare for
    /// shutdown.
    fn shutdown(
        &mut self,
        _: (),
    ) -> BoxFuture<'static, Result<(), Self::Error>> {
        Box::pin(async move { Ok(()) })
    }

    /// This method is called to exit the server process.
    ///
    /// It should only be called after the shutdown method has been called.
    fn exit(&mut self, _: ()) -> Self::NotifyResult {
        ControlFlow::Break(Ok(()))
    }
}

/// Structure, which holds updated configuration.
struct UpdateConfig(Config);

impl YARALanguageServer {
    pub fn new_router(client: ClientSocket) -> Router<Self> {
        let sink = Arc::new(ClientSink::new(client.clone()));
        let config = Config::default();
        let pipeline = Arc::new(Pipeline::new(
            sink.clone(),
            Some(Arc::new(ExternalCompiler::new(config.compiler_path.clone()))),
            config,
        ));
        let mut router = Router::from_language_server(Self {
            client,
            sink,
            pipeline,
            formatter: Arc::new(CanonicalFormatter),
            workspace: None,
        });
        router.event(Self::update_config);
        router
    }

    /// Watches the YARA files in the workspace and indexes them.
    fn start_caching(&mut self) {
        let Some(root) = self.workspace.clone() else {
            info!("no workspace folder, nothing to cache");
            return;
        };

        let mut client = self.client.clone();
        let register_options = to_value(DidChangeWatchedFilesRegistrationOptions {
            watchers: vec![FileSystemWatcher {
                glob_pattern: GlobPattern::String(
                    "**/*.{yar,yara}".to_string(),
                ),
                kind: Some(WatchKind::all()),
            }],
        })
        .ok();

        tokio::spawn(async move {
            let _ = client
                .register_capability(RegistrationParams {
                    registrations: vec![Registration {
                        id: WATCHED_FILES_ID.to_string(),
                        method: "workspace/didChangeWatchedFiles".to_string(),
                        register_options,
                    }],
                })
                .await;
        });

        self.pipeline.cache_workspace(&root);
    }

    fn stop_caching(&mut self) {
        let mut client = self.client.clone();
        tokio::spawn(async move {
            let _ = client
                .unregister_capability(UnregistrationParams {
                    unregisterations: vec![Unregistration {
                        id: WATCHED_FILES_ID.to_string(),
                        method: "workspace/didChangeWatchedFiles".to_string(),
                    }],
                })
                .await;
        });

        self.pipeline.clear_cache();
    }

    /// This method is used to read the configuration using pull model.
    /// Then it emits the event, which will update the configuration in the
    /// server state.
    fn load_config(&mut self) {
        let mut client = self.client.clone();
        tokio::spawn(async move {
            let config = client
                .configuration(ConfigurationParams {
                    items: vec![ConfigurationItem {
                        scope_uri: None,
                        section: Some("YARA".to_string()),
                    }],
                })
                .await
                .ok()
                .and_then(|mut res| res.pop())
                .and_then(|value| from_value::<Config>(value).ok());

            match config {
                Some(config) => {
                    let _ = client.emit(UpdateConfig(config));
                }
                None => {
                    warn!("failed to parse configuration");
                    let _ = client.show_message(ShowMessageParams {
                        typ: MessageType::ERROR,
                        message: "YARA: failed to parse configuration"
                            .to_string(),
                    });
                }
            }
        });
    }

    /// This method is used to save the new configuration in the server
    /// state and also to react to changes.
    fn update_config(
        &mut self,
        value: UpdateConfig,
    ) -> ControlFlow<async_lsp::Result<()>> {
        let config = value.0;
        let previous = self.pipeline.config();
        let cache_before = previous.cache_workspace;
        let cache_after = config.cache_workspace;

        if config.compiler_path != previous.compiler_path {
            info!("using rule compiler `{}`", config.compiler_path);
            self.pipeline.set_compiler(Some(Arc::new(ExternalCompiler::new(
                config.compiler_path.clone(),
            ))));
        }

        self.pipeline.set_config(config);

        match (cache_before, cache_after) {
            (false, true) => self.start_caching(),
            (true, false) => self.stop_caching(),
            _ => {}
        }

        ControlFlow::Continue(())
    }
}
