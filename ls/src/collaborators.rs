/*! Interfaces to the systems that the language server relies on but doesn't
implement: the rule compiler that produces authoritative errors and
warnings, and the sink where diagnostics are published (normally the
editor).
 */

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_lsp::lsp_types::{Diagnostic, PublishDiagnosticsParams, Url};
use async_lsp::{ClientSocket, LanguageClient};
use futures::future::BoxFuture;
use log::{debug, warn};

use crate::documents::Severity;
use crate::errors::CompileError;

/// A file passed to the rule compiler.
#[derive(Debug, Clone)]
pub struct SourceText {
    pub uri: Url,
    pub text: Arc<str>,
}

/// An error or warning produced by the rule compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerMessage {
    pub file: Url,
    /// One-based line number.
    pub line: u32,
    pub severity: Severity,
    pub message: String,
}

/// A rule compiler.
///
/// The first file is the one being analysed, the remaining ones are the
/// rest of the workspace, which the compiler may use for resolving
/// includes. Compilation may be slow, and the future may be dropped before
/// completion if the result is no longer needed.
pub trait RuleCompiler: Send + Sync {
    fn compile(
        &self,
        files: Vec<SourceText>,
    ) -> BoxFuture<'static, Result<Vec<CompilerMessage>, CompileError>>;
}

/// Destination of the diagnostics produced by the analysis pipeline.
pub trait DiagnosticsSink: Send + Sync {
    fn publish(&self, uri: Url, version: Option<i32>, diagnostics: Vec<Diagnostic>);
}

/// Publishes diagnostics to the editor with `textDocument/publishDiagnostics`
/// notifications.
///
/// Editors that pull diagnostics with `textDocument/diagnostic` don't
/// receive notifications; instead they are asked to pull again with
/// `workspace/diagnostic/refresh`.
pub struct ClientSink {
    client: ClientSocket,
    push: AtomicBool,
}

impl ClientSink {
    pub fn new(client: ClientSocket) -> Self {
        Self { client, push: AtomicBool::new(true) }
    }

    /// Selects between the push model (the default) and the pull model.
    pub fn set_push(&self, push: bool) {
        self.push.store(push, Ordering::Relaxed);
    }
}

impl DiagnosticsSink for ClientSink {
    fn publish(&self, uri: Url, version: Option<i32>, diagnostics: Vec<Diagnostic>) {
        let mut client = self.client.clone();

        if !self.push.load(Ordering::Relaxed) {
            tokio::spawn(async move {
                if let Err(err) = client.workspace_diagnostic_refresh(()).await {
                    debug!("diagnostics refresh failed: {err}");
                }
            });
            return;
        }

        if let Err(err) = client.publish_diagnostics(PublishDiagnosticsParams {
            uri,
            diagnostics,
            version,
        }) {
            warn!("failed to publish diagnostics: {err}");
        }
    }
}

/// Runs an external compiler executable (e.g. `yarac`) and parses its
/// output.
///
/// The document is written to a temporary file, because the text in the
/// editor may not be saved. The compiler runs in the directory of the
/// original file, so relative includes still work. Only the first of the
/// files is compiled; [`Pipeline::compile_all`] runs one pass per document.
///
/// [`Pipeline::compile_all`]: crate::pipeline::Pipeline::compile_all
pub struct ExternalCompiler {
    program: String,
}

impl ExternalCompiler {
    pub fn new<P: Into<String>>(program: P) -> Self {
        Self { program: program.into() }
    }
}

impl RuleCompiler for ExternalCompiler {
    fn compile(
        &self,
        files: Vec<SourceText>,
    ) -> BoxFuture<'static, Result<Vec<CompilerMessage>, CompileError>> {
        let program = self.program.clone();
        Box::pin(async move {
            let Some(target) = files.into_iter().next() else {
                return Ok(Vec::new());
            };

            let tmp_dir = std::env::temp_dir();
            static NEXT_ID: AtomicU64 = AtomicU64::new(0);
            let id = format!(
                "{}-{}",
                std::process::id(),
                NEXT_ID.fetch_add(1, Ordering::Relaxed)
            );
            let source = tmp_dir.join(format!("yarals-{id}.yar"));
            let output = tmp_dir.join(format!("yarals-{id}.yarc"));

            tokio::fs::write(&source, target.text.as_bytes())
                .await
                .map_err(|err| CompileError::Failed(err.to_string()))?;

            let mut command = tokio::process::Command::new(&program);
            command
                .arg(&source)
                .arg(&output)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            if let Some(dir) = target
                .uri
                .to_file_path()
                .ok()
                .and_then(|path| path.parent().map(PathBuf::from))
            {
                command.current_dir(dir);
            }

            let result = command.output().await;

            let _ = tokio::fs::remove_file(&source).await;
            let _ = tokio::fs::remove_file(&output).await;

            let result = match result {
                Ok(result) => result,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    return Err(CompileError::Unavailable)
                }
                Err(err) => return Err(CompileError::Failed(err.to_string())),
            };

            debug!("`{program}` exited with {}", result.status);

            let stderr = String::from_utf8_lossy(&result.stderr);
            let stdout = String::from_utf8_lossy(&result.stdout);

            Ok(stderr
                .lines()
                .chain(stdout.lines())
                .filter_map(|line| parse_compiler_line(&target.uri, line))
                .collect())
        })
    }
}

/// Parses a line of compiler output with the format
/// `<file>(<line>): <error|warning>: <message>`.
pub fn parse_compiler_line(file: &Url, line: &str) -> Option<CompilerMessage> {
    let close = line.find("): ")?;
    let open = line[..close].rfind('(')?;
    let line_no = line[open + 1..close].trim().parse::<u32>().ok()?;
    let rest = &line[close + 3..];

    let (severity, message) = if let Some(msg) = rest.strip_prefix("error: ") {
        (Severity::Error, msg)
    } else if let Some(msg) = rest.strip_prefix("warning: ") {
        (Severity::Warning, msg)
    } else {
        (Severity::Error, rest)
    };

    Some(CompilerMessage {
        file: file.clone(),
        line: line_no,
        severity,
        message: message.trim().to_string(),
    })
}
