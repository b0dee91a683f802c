use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_lsp::lsp_types::{
    Diagnostic, DiagnosticSeverity, NumberOrString, Position, Range, Url,
};
use futures::future::BoxFuture;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::collaborators::{
    parse_compiler_line, CompilerMessage, DiagnosticsSink, RuleCompiler,
    SourceText,
};
use crate::configuration::Config;
use crate::documents::Severity;
use crate::errors::{CompileError, RequestError};
use crate::pipeline::{Phase, Pipeline};
use crate::tests::uri;

type Published = (Url, Option<i32>, Vec<Diagnostic>);

/// Records every publication.
struct RecordingSink(UnboundedSender<Published>);

impl DiagnosticsSink for RecordingSink {
    fn publish(&self, uri: Url, version: Option<i32>, diagnostics: Vec<Diagnostic>) {
        let _ = self.0.send((uri, version, diagnostics));
    }
}

/// A compiler that takes `delay` to return the same result every time.
struct ScriptedCompiler {
    calls: Arc<AtomicUsize>,
    delay: Duration,
    result: Result<Vec<CompilerMessage>, CompileError>,
}

impl RuleCompiler for ScriptedCompiler {
    fn compile(
        &self,
        _files: Vec<SourceText>,
    ) -> BoxFuture<'static, Result<Vec<CompilerMessage>, CompileError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;
        let result = self.result.clone();
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            result
        })
    }
}

fn warning(line: u32, message: &str) -> CompilerMessage {
    CompilerMessage {
        file: uri("a.yar"),
        line,
        severity: Severity::Warning,
        message: message.to_string(),
    }
}

struct Harness {
    pipeline: Arc<Pipeline>,
    published: UnboundedReceiver<Published>,
    calls: Arc<AtomicUsize>,
}

impl Harness {
    fn new(
        compiler: Option<(Duration, Result<Vec<CompilerMessage>, CompileError>)>,
        config: Config,
    ) -> Self {
        let (tx, published) = unbounded_channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let compiler = compiler.map(|(delay, result)| {
            Arc::new(ScriptedCompiler { calls: Arc::clone(&calls), delay, result })
                as Arc<dyn RuleCompiler>
        });
        let pipeline =
            Arc::new(Pipeline::new(Arc::new(RecordingSink(tx)), compiler, config));
        Self { pipeline, published, calls }
    }

    fn drain(&mut self) -> Vec<Published> {
        let mut result = Vec::new();
        while let Ok(published) = self.published.try_recv() {
            result.push(published);
        }
        result
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

const VALID: &str = "rule A {\n    condition: true\n}";

#[test]
fn parse_diagnostics_without_compiler() {
    let mut h = Harness::new(None, Config::default());
    let text = "rule A { strings: $a = \"x\" condition: $b }";

    assert!(h.pipeline.open_or_change(uri("a.yar"), 1, text.to_string()));

    let published = h.drain();
    assert_eq!(published.len(), 1);

    let (published_uri, version, diagnostics) = &published[0];
    assert_eq!(published_uri, &uri("a.yar"));
    assert_eq!(*version, Some(1));
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
        diagnostics[0].code,
        Some(NumberOrString::String("unknown_pattern".to_string()))
    );

    assert_eq!(h.pipeline.phase(&uri("a.yar")), Phase::Indexed);
    assert_eq!(h.pipeline.phase(&uri("other.yar")), Phase::Unanalyzed);
}

#[test]
fn out_of_order_versions_are_ignored() {
    let h = Harness::new(None, Config::default());

    assert!(h.pipeline.open_or_change(uri("a.yar"), 2, VALID.to_string()));
    assert!(!h.pipeline.open_or_change(uri("a.yar"), 1, String::new()));
    assert!(!h.pipeline.open_or_change(uri("a.yar"), 2, String::new()));

    let snapshot = h.pipeline.snapshot();
    let index = snapshot.document(&uri("a.yar")).unwrap();
    assert_eq!(index.document.version, Some(2));
    assert_eq!(&*index.document.text, VALID);
}

#[tokio::test(start_paused = true)]
async fn edits_are_debounced() {
    let mut h = Harness::new(
        Some((Duration::ZERO, Ok(vec![warning(2, "slow condition")]))),
        Config::default(),
    );

    h.pipeline.open_or_change(uri("a.yar"), 1, "rule A {".to_string());
    h.pipeline.open_or_change(uri("a.yar"), 2, VALID.to_string());

    // Nothing is published before the debounce delay expires.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.drain().is_empty());

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(h.calls(), 1);
    assert_eq!(
        h.drain(),
        vec![(
            uri("a.yar"),
            Some(2),
            vec![Diagnostic {
                range: Range::new(Position::new(1, 4), Position::new(1, 19)),
                severity: Some(DiagnosticSeverity::WARNING),
                source: Some("compiler".to_string()),
                message: "slow condition".to_string(),
                ..Default::default()
            }]
        )]
    );

    let pulled = h.pipeline.diagnostics(&uri("a.yar")).unwrap();
    assert_eq!(pulled.len(), 1);
    assert_eq!(pulled[0].message, "slow condition");
}

#[tokio::test(start_paused = true)]
async fn unavailable_compiler_degrades_to_parse_diagnostics() {
    let mut h = Harness::new(
        Some((Duration::ZERO, Err(CompileError::Unavailable))),
        Config::default(),
    );

    h.pipeline.open_or_change(uri("a.yar"), 1, VALID.to_string());
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(h.calls(), 1);
    assert_eq!(h.drain(), vec![(uri("a.yar"), Some(1), vec![])]);
    assert!(!h.pipeline.compiler_available(&uri("a.yar")));
    assert_eq!(h.pipeline.phase(&uri("a.yar")), Phase::Indexed);
}

#[tokio::test(start_paused = true)]
async fn superseded_compilation_is_discarded() {
    let mut h = Harness::new(
        Some((Duration::from_secs(1), Ok(vec![warning(1, "warning")]))),
        Config::default(),
    );

    h.pipeline.open_or_change(uri("a.yar"), 1, VALID.to_string());

    // The first compilation starts after 300ms and lasts one second.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.calls(), 1);
    assert_eq!(h.pipeline.phase(&uri("a.yar")), Phase::Compiling);

    h.pipeline.open_or_change(uri("a.yar"), 2, format!("{VALID}\n"));
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(h.calls(), 2);

    let versions: Vec<_> =
        h.drain().into_iter().map(|(_, version, _)| version).collect();
    assert_eq!(versions, vec![Some(2)]);
}

#[tokio::test(start_paused = true)]
async fn save_compiles_without_debounce() {
    let config = Config { compile_on_change: false, ..Default::default() };
    let mut h = Harness::new(
        Some((Duration::ZERO, Ok(vec![warning(1, "saved")]))),
        config,
    );

    h.pipeline.open_or_change(uri("a.yar"), 1, VALID.to_string());

    // Without compile on change, parse diagnostics are published at once.
    assert_eq!(h.drain(), vec![(uri("a.yar"), Some(1), vec![])]);
    assert_eq!(h.calls(), 0);

    let saved = "rule A {\n    condition: false\n}";
    h.pipeline.save(uri("a.yar"), Some(saved.to_string()));
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(h.calls(), 1);

    let published = h.drain();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].1, Some(1));
    assert_eq!(published[0].2[0].message, "saved");

    let snapshot = h.pipeline.snapshot();
    assert_eq!(&*snapshot.document(&uri("a.yar")).unwrap().document.text, saved);
}

#[tokio::test(start_paused = true)]
async fn compile_now_bypasses_configuration() {
    let config = Config {
        compile_on_change: false,
        compile_on_save: false,
        ..Default::default()
    };
    let mut h = Harness::new(
        Some((Duration::ZERO, Ok(vec![warning(1, "now")]))),
        config,
    );

    h.pipeline.open_or_change(uri("a.yar"), 1, VALID.to_string());
    h.drain();

    Arc::clone(&h.pipeline).compile_now(uri("a.yar")).await;

    assert_eq!(h.calls(), 1);
    let published = h.drain();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].2[0].message, "now");
    assert_eq!(h.pipeline.phase(&uri("a.yar")), Phase::Indexed);
}

#[tokio::test(start_paused = true)]
async fn compile_all_compiles_every_open_document() {
    let config = Config { compile_on_change: false, ..Default::default() };
    let mut h = Harness::new(
        Some((Duration::ZERO, Ok(vec![warning(1, "in a")]))),
        config,
    );

    h.pipeline.open_or_change(uri("a.yar"), 1, VALID.to_string());
    h.pipeline.open_or_change(
        uri("b.yar"),
        1,
        "rule B {\n    condition: true\n}".to_string(),
    );
    h.drain();

    h.pipeline.compile_all();
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(h.calls(), 2);

    let mut published = h.drain();
    published.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));

    assert_eq!(published.len(), 2);
    assert_eq!(published[0].0, uri("a.yar"));
    assert_eq!(published[0].2.len(), 1);
    assert_eq!(published[0].2[0].message, "in a");
    // Messages about other files are not attached to b.yar.
    assert_eq!(published[1], (uri("b.yar"), Some(1), vec![]));
}

#[tokio::test(start_paused = true)]
async fn replaced_compiler_is_used_by_later_passes() {
    let config = Config { compile_on_change: false, ..Default::default() };
    let mut h = Harness::new(None, config);

    h.pipeline.open_or_change(uri("a.yar"), 1, VALID.to_string());
    h.drain();

    Arc::clone(&h.pipeline).compile_now(uri("a.yar")).await;
    assert_eq!(h.drain(), vec![(uri("a.yar"), Some(1), vec![])]);

    let calls = Arc::new(AtomicUsize::new(0));
    h.pipeline.set_compiler(Some(Arc::new(ScriptedCompiler {
        calls: Arc::clone(&calls),
        delay: Duration::ZERO,
        result: Ok(vec![warning(1, "replaced")]),
    })));

    Arc::clone(&h.pipeline).compile_now(uri("a.yar")).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let published = h.drain();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].2[0].message, "replaced");
}

#[test]
fn close_clears_diagnostics() {
    let mut h = Harness::new(None, Config::default());

    h.pipeline.open_or_change(uri("a.yar"), 1, VALID.to_string());
    h.drain();

    h.pipeline.close(&uri("a.yar"));

    assert_eq!(h.drain(), vec![(uri("a.yar"), None, vec![])]);
    assert!(h.pipeline.snapshot().document(&uri("a.yar")).is_none());
    assert_eq!(h.pipeline.phase(&uri("a.yar")), Phase::Unanalyzed);
}

#[test]
fn duplicate_rules_across_documents() {
    let mut h = Harness::new(None, Config::default());

    h.pipeline.open_or_change(uri("a.yar"), 1, VALID.to_string());
    h.pipeline.open_or_change(uri("b.yar"), 1, VALID.to_string());

    let published = h.drain();
    assert_eq!(published.len(), 2);
    assert!(published[0].2.is_empty());
    assert_eq!(published[1].0, uri("b.yar"));
    assert_eq!(
        published[1].2[0].code,
        Some(NumberOrString::String("duplicate_rule".to_string()))
    );
}

#[test]
fn stale_snapshots_are_detected() {
    let h = Harness::new(None, Config::default());

    h.pipeline.open_or_change(uri("a.yar"), 1, VALID.to_string());
    let snapshot = h.pipeline.snapshot();
    assert_eq!(h.pipeline.ensure_current(&snapshot), Ok(()));

    h.pipeline.open_or_change(uri("a.yar"), 2, String::new());
    assert_eq!(
        h.pipeline.ensure_current(&snapshot),
        Err(RequestError::StaleSnapshot)
    );

    // The old snapshot still sees the old version.
    assert_eq!(
        snapshot.document(&uri("a.yar")).unwrap().document.version,
        Some(1)
    );
}

#[test]
fn compiler_output_lines() {
    let file = uri("a.yar");

    assert_eq!(
        parse_compiler_line(&file, "/tmp/yarals-1.yar(3): error: syntax error"),
        Some(CompilerMessage {
            file: file.clone(),
            line: 3,
            severity: Severity::Error,
            message: "syntax error".to_string(),
        })
    );

    assert_eq!(
        parse_compiler_line(&file, "x.yar(12): warning: slow pattern"),
        Some(CompilerMessage {
            file: file.clone(),
            line: 12,
            severity: Severity::Warning,
            message: "slow pattern".to_string(),
        })
    );

    assert_eq!(parse_compiler_line(&file, "Segmentation fault"), None);
}

#[test]
fn resolved_conflicts_are_republished() {
    let mut h = Harness::new(None, Config::default());

    h.pipeline.open_or_change(uri("a.yar"), 1, VALID.to_string());
    h.pipeline.open_or_change(uri("b.yar"), 1, VALID.to_string());

    let published = h.drain();
    assert_eq!(published[1].0, uri("b.yar"));
    assert_eq!(published[1].2.len(), 1);

    // Renaming the first declaration leaves `b.yar` without duplicates.
    h.pipeline.open_or_change(
        uri("a.yar"),
        2,
        "rule Z {\n    condition: true\n}".to_string(),
    );

    assert_eq!(
        h.drain(),
        vec![(uri("b.yar"), Some(1), vec![]), (uri("a.yar"), Some(2), vec![])]
    );

    // Declaring it again brings the duplicate back.
    h.pipeline.open_or_change(uri("a.yar"), 3, VALID.to_string());

    let published = h.drain();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].0, uri("b.yar"));
    assert_eq!(
        published[0].2[0].code,
        Some(NumberOrString::String("duplicate_rule".to_string()))
    );
    assert_eq!(published[1], (uri("a.yar"), Some(3), vec![]));
}

#[test]
fn closing_a_document_republishes_conflicts() {
    let mut h = Harness::new(None, Config::default());

    h.pipeline.open_or_change(uri("a.yar"), 1, VALID.to_string());
    h.pipeline.open_or_change(uri("b.yar"), 1, VALID.to_string());
    h.drain();

    h.pipeline.close(&uri("a.yar"));

    assert_eq!(
        h.drain(),
        vec![(uri("a.yar"), None, vec![]), (uri("b.yar"), Some(1), vec![])]
    );
}
