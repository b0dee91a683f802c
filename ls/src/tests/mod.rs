use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;

use async_lsp::concurrency::ConcurrencyLayer;
use async_lsp::lsp_types::notification::{
    DidCloseTextDocument, DidOpenTextDocument, PublishDiagnostics,
};
use async_lsp::lsp_types::{
    ClientCapabilities, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    InitializeParams, InitializedParams, Position, Range,
    TextDocumentIdentifier, TextDocumentItem, Url,
};
use async_lsp::router::Router;
use async_lsp::server::LifecycleLayer;
use async_lsp::{LanguageServer, ServerSocket};
use futures::AsyncReadExt;
use serde_json::json;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tower::ServiceBuilder;

use crate::documents::document::Document;
use crate::index::{DocumentIndex, Snapshot};
use crate::server::YARALanguageServer;

mod completion;
mod configuration;
mod diagnostics;
mod document_highlights;
mod formatting;
mod goto;
mod hover;
mod line_index;
mod pipeline;
mod schema;

/// Returns the URI of a file in a fictitious workspace.
pub(crate) fn uri(name: &str) -> Url {
    Url::parse(&format!("file:///workspace/{name}")).unwrap()
}

/// Builds a snapshot with the given `(file name, text)` documents,
/// registered in the given order.
pub(crate) fn snapshot(documents: &[(&str, &str)]) -> Snapshot {
    let indexes = documents.iter().enumerate().map(|(order, (name, text))| {
        let document = Document::parse(uri(name), Some(1), *text);
        Arc::new(DocumentIndex::new(document, order as u64))
    });
    Snapshot::default().with_documents(indexes)
}

/// Returns the byte offset of the `nth` occurrence of `needle` in `text`.
pub(crate) fn offset_of(text: &str, needle: &str, nth: usize) -> usize {
    text.match_indices(needle)
        .nth(nth)
        .map(|(i, _)| i)
        .unwrap_or_else(|| panic!("`{needle}` #{nth} not found in {text:?}"))
}

/// Converts a byte offset into a position. Only valid for ASCII text.
pub(crate) fn position_at(text: &str, offset: usize) -> Position {
    let before = &text[..offset];
    let line = before.matches('\n').count();
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    Position::new(line as u32, (offset - line_start) as u32)
}

/// Position of the `nth` occurrence of `needle` in `text`.
pub(crate) fn position_of(text: &str, needle: &str, nth: usize) -> Position {
    position_at(text, offset_of(text, needle, nth))
}

/// Position right after the `nth` occurrence of `needle` in `text`.
pub(crate) fn position_after(text: &str, needle: &str, nth: usize) -> Position {
    position_at(text, offset_of(text, needle, nth) + needle.len())
}

/// Range of the `nth` occurrence of `needle` in `text`.
pub(crate) fn range_of(text: &str, needle: &str, nth: usize) -> Range {
    let start = offset_of(text, needle, nth);
    Range::new(position_at(text, start), position_at(text, start + needle.len()))
}

struct ClientState;

/// Runs a language server connected to an in-memory client, and calls `f`
/// once the server is initialized. Compilation is disabled, so the tests
/// don't depend on an external compiler.
pub(crate) async fn lsp_test<F, R>(f: F)
where
    R: Future<Output = ServerSocket>,
    F: FnOnce(ServerSocket) -> R,
{
    let (server, _) = async_lsp::MainLoop::new_server(|client| {
        ServiceBuilder::new()
            .layer(LifecycleLayer::default())
            .layer(ConcurrencyLayer::default())
            .service(YARALanguageServer::new_router(client))
    });

    let (client, mut server_socket) =
        async_lsp::MainLoop::new_client(|_server| {
            let mut router = Router::new(ClientState {});
            router.notification::<PublishDiagnostics>(|_, _| {
                ControlFlow::Continue(())
            });
            ServiceBuilder::new().service(router)
        });

    let (client_stream, server_stream) = tokio::io::duplex(64000);

    let (client_rx, client_tx) = client_stream.compat().split();
    let (server_rx, server_tx) = server_stream.compat().split();

    tokio::select! {
        _ = server.run_buffered(server_rx, server_tx) => {}
        _ = client.run_buffered(client_rx, client_tx) => {}
        _ = async {
            // Send request to initialize the server.
            server_socket
                .initialize(InitializeParams {
                    capabilities: ClientCapabilities::default(),
                    initialization_options: Some(json!({
                        "compileOnChange": false,
                        "compileOnSave": false,
                    })),
                    ..Default::default()
                })
                .await
                .expect("failed to initialize the LSP");

            // Send notification that tells the server that the client has
            // received the result of the initialization request.
            server_socket
                .initialized(InitializedParams {})
                .expect("failed to notify the server that the client was initialized");

            f(server_socket).await.shutdown(()).await.expect("server shutdown");
        } => {}
    }
}

pub(crate) fn open_document(s: &ServerSocket, uri: &Url, text: &str) {
    s.notify::<DidOpenTextDocument>(DidOpenTextDocumentParams {
        text_document: TextDocumentItem {
            uri: uri.clone(),
            language_id: "yara".to_string(),
            version: 1,
            text: text.to_string(),
        },
    })
    .expect("DidOpenTextDocument notification failed");
}

pub(crate) fn close_document(s: &ServerSocket, uri: &Url) {
    s.notify::<DidCloseTextDocument>(DidCloseTextDocumentParams {
        text_document: TextDocumentIdentifier { uri: uri.clone() },
    })
    .expect("DidCloseTextDocument notification failed");
}
