//! LSP server for trailcheck
//!
//! Provides editor features for commit message buffers:
//! - Diagnostics: grammar findings, re-published after every settled edit
//! - Inlay hints: resolved ticket / changeset / profile details at line end
//! - Hover: the resolution of the reference under the cursor

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use eyre::Result;
use tokio::sync::mpsc;
use tower_lsp::jsonrpc::Result as LspResult;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing::{debug, info};
use trailcheck_core::{Finding, Severity};

use crate::config::Config;
use crate::coordinator::{Annotation, AnnotationStatus, Coordinator};
use crate::fetch::HttpFetcher;
use crate::present::Presenter;
use crate::resolver::Resolver;
use crate::session::Session;

/// Run the LSP server over stdio
pub async fn run(config: Config) -> Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(|client| Backend::new(client, &config));
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}

/// Document text and committed annotations, shared between the backend and
/// the presenter
#[derive(Default)]
struct Documents {
    text: HashMap<String, String>,
    annotations: HashMap<String, BTreeMap<usize, Arc<[Annotation]>>>,
}

type SharedDocuments = Arc<Mutex<Documents>>;

fn lock(documents: &SharedDocuments) -> MutexGuard<'_, Documents> {
    documents.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Messages for the client, sent in order by one forwarding task
enum Outgoing {
    Diagnostics(Url, Vec<Diagnostic>),
    RefreshHints,
}

struct LspPresenter {
    documents: SharedDocuments,
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl LspPresenter {
    fn send(&self, message: Outgoing) {
        if self.outgoing.send(message).is_err() {
            debug!("client forwarder has stopped, dropping message");
        }
    }

    /// Forget a document and clear its diagnostics. The clear is queued
    /// behind everything already sent for it.
    fn close(&self, uri: Url) {
        let mut documents = lock(&self.documents);
        documents.text.remove(uri.as_str());
        documents.annotations.remove(uri.as_str());
        self.send(Outgoing::Diagnostics(uri, Vec::new()));
    }
}

// Both methods send while holding the documents lock, so nothing for a
// document can be queued after its close.
impl Presenter for LspPresenter {
    fn findings(&self, buffer: &str, findings: &[Finding]) {
        let Ok(uri) = Url::parse(buffer) else {
            return;
        };
        let documents = lock(&self.documents);
        let Some(text) = documents.text.get(buffer) else {
            debug!(buffer, "dropping findings for closed document");
            return;
        };
        let diagnostics = findings.iter().map(|f| to_diagnostic(text, f)).collect();
        self.send(Outgoing::Diagnostics(uri, diagnostics));
    }

    fn annotations(&self, buffer: &str, line: usize, annotations: Arc<[Annotation]>) {
        let mut documents = lock(&self.documents);
        if !documents.text.contains_key(buffer) {
            debug!(buffer, line, "dropping annotations for closed document");
            return;
        }
        let lines = documents.annotations.entry(buffer.to_string()).or_default();
        if annotations.is_empty() {
            lines.remove(&line);
        } else {
            lines.insert(line, annotations);
        }
        self.send(Outgoing::RefreshHints);
    }
}

async fn forward(client: Client, mut outgoing: mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(message) = outgoing.recv().await {
        match message {
            Outgoing::Diagnostics(uri, diagnostics) => {
                client.publish_diagnostics(uri, diagnostics, None).await;
            }
            Outgoing::RefreshHints => {
                if let Err(e) = client.inlay_hint_refresh().await {
                    debug!("inlay hint refresh failed: {e}");
                }
            }
        }
    }
}

struct Backend {
    session: Session,
    presenter: Arc<LspPresenter>,
}

impl Backend {
    fn new(client: Client, config: &Config) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward(client, rx));

        let presenter = Arc::new(LspPresenter {
            documents: SharedDocuments::default(),
            outgoing: tx,
        });
        let fetch = Arc::new(HttpFetcher::new(config.fetch_timeout()));
        let coordinator = Coordinator::new(
            Resolver::from_config(config, fetch),
            Arc::clone(&presenter) as Arc<dyn Presenter>,
        );
        let (session, _task) = Session::spawn(coordinator, config.debounce());

        Self { session, presenter }
    }

    fn documents(&self) -> MutexGuard<'_, Documents> {
        lock(&self.presenter.documents)
    }

    fn document_changed(&self, uri: &Url, text: String) {
        self.documents().text.insert(uri.to_string(), text.clone());
        self.session.edit(uri.as_str(), text);
    }

    /// Annotation under the cursor
    fn annotation_at(&self, uri: &Url, position: Position) -> Option<(Annotation, Range)> {
        let documents = self.documents();
        let text = documents.text.get(uri.as_str())?;
        let line = position.line as usize;
        let line_text = text.split('\n').nth(line)?;
        let column = char_column(line_text, position.character);

        let annotation = documents
            .annotations
            .get(uri.as_str())?
            .get(&line)?
            .iter()
            .find(|a| a.start <= column && column < a.end)?
            .clone();

        let range = Range {
            start: Position::new(position.line, utf16_column(line_text, annotation.start)),
            end: Position::new(position.line, utf16_column(line_text, annotation.end)),
        };
        Some((annotation, range))
    }
}

/// UTF-16 offset of a character column, as LSP positions count
fn utf16_column(line: &str, column: usize) -> u32 {
    line.chars().take(column).map(char::len_utf16).sum::<usize>() as u32
}

/// Character column of a UTF-16 offset
fn char_column(line: &str, utf16: u32) -> usize {
    let mut units = 0;
    for (column, c) in line.chars().enumerate() {
        if units >= utf16 as usize {
            return column;
        }
        units += c.len_utf16();
    }
    line.chars().count()
}

fn to_diagnostic(text: &str, finding: &Finding) -> Diagnostic {
    let line_text = text.split('\n').nth(finding.line).unwrap_or("");
    let line = finding.line as u32;
    Diagnostic {
        range: Range {
            start: Position::new(line, utf16_column(line_text, finding.start)),
            end: Position::new(line, utf16_column(line_text, finding.end)),
        },
        severity: Some(match finding.severity {
            Severity::Error => DiagnosticSeverity::ERROR,
            Severity::Warning => DiagnosticSeverity::WARNING,
        }),
        code: Some(NumberOrString::String(finding.code.clone())),
        source: Some("trailcheck".into()),
        message: finding.message.clone(),
        ..Default::default()
    }
}

fn status_marker(status: AnnotationStatus) -> &'static str {
    match status {
        AnnotationStatus::Valid => "✓",
        AnnotationStatus::Invalid => "✗",
        AnnotationStatus::Unknown => "?",
    }
}

fn hint_label(annotations: &[Annotation]) -> String {
    annotations
        .iter()
        .map(|a| format!("{} {}", status_marker(a.status), a.text))
        .collect::<Vec<_>>()
        .join("  ")
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, _: InitializeParams) -> LspResult<InitializeResult> {
        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                inlay_hint_provider: Some(OneOf::Left(true)),
                // Sync full document content
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "trailcheck".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        info!("trailcheck language server ready");
    }

    async fn shutdown(&self) -> LspResult<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.document_changed(&params.text_document.uri, params.text_document.text);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        if let Some(change) = params.content_changes.into_iter().last() {
            self.document_changed(&params.text_document.uri, change.text);
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.session.close(uri.as_str());
        self.presenter.close(uri);
    }

    async fn inlay_hint(&self, params: InlayHintParams) -> LspResult<Option<Vec<InlayHint>>> {
        let uri = params.text_document.uri.as_str();
        let documents = self.documents();
        let (Some(text), Some(lines)) = (documents.text.get(uri), documents.annotations.get(uri))
        else {
            return Ok(None);
        };

        let (first, last) = (params.range.start.line, params.range.end.line);
        if first > last {
            return Ok(None);
        }
        let visible = first as usize..=last as usize;
        let hints: Vec<InlayHint> = lines
            .range(visible)
            .filter_map(|(&line, annotations)| {
                let line_text = text.split('\n').nth(line)?;
                let line_text = line_text.strip_suffix('\r').unwrap_or(line_text);
                Some(InlayHint {
                    position: Position::new(
                        line as u32,
                        utf16_column(line_text, line_text.chars().count()),
                    ),
                    label: InlayHintLabel::String(hint_label(annotations)),
                    kind: None,
                    text_edits: None,
                    tooltip: None,
                    padding_left: Some(true),
                    padding_right: None,
                    data: None,
                })
            })
            .collect();

        if hints.is_empty() {
            return Ok(None);
        }
        Ok(Some(hints))
    }

    async fn hover(&self, params: HoverParams) -> LspResult<Option<Hover>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some((annotation, range)) = self.annotation_at(uri, position) else {
            return Ok(None);
        };

        let content = format!(
            "**{}** ({} {})\n\n{} {}",
            annotation.label(),
            annotation.kind,
            annotation.status.as_str(),
            status_marker(annotation.status),
            annotation.text
        );

        Ok(Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: content,
            }),
            range: Some(range),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trailcheck_core::validate;

    #[test]
    fn utf16_columns() {
        assert_eq!(utf16_column("abc", 2), 2);
        assert_eq!(utf16_column("😀 #1", 2), 3);
        assert_eq!(char_column("😀 #1", 3), 2);
        assert_eq!(char_column("ab", 10), 2);
    }

    #[test]
    fn diagnostics_carry_code_and_source() {
        let text = "widgets: fix bug";
        let findings = validate(text);
        let diagnostic = to_diagnostic(text, &findings[0]);
        assert_eq!(diagnostic.source.as_deref(), Some("trailcheck"));
        assert_eq!(diagnostic.severity, Some(DiagnosticSeverity::WARNING));
        assert_eq!(
            diagnostic.code,
            Some(NumberOrString::String("summary.capital".to_string()))
        );
    }

    const URI: &str = "file:///repo/.git/COMMIT_EDITMSG";

    fn open_presenter() -> (LspPresenter, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let presenter = LspPresenter {
            documents: SharedDocuments::default(),
            outgoing: tx,
        };
        lock(&presenter.documents)
            .text
            .insert(URI.to_string(), "Fix it.\n\nSee #1.".to_string());
        (presenter, rx)
    }

    fn ticket_hint() -> Arc<[Annotation]> {
        Arc::from(vec![Annotation {
            start: 4,
            end: 6,
            kind: trailcheck_core::EntityKind::Ticket,
            identifier: "1".to_string(),
            text: "One".to_string(),
            status: AnnotationStatus::Valid,
        }])
    }

    #[test]
    fn close_clears_after_queued_diagnostics() {
        let (presenter, mut rx) = open_presenter();
        let uri = Url::parse(URI).expect("valid uri");

        presenter.findings(URI, &validate("Fix it."));
        presenter.close(uri.clone());

        let Ok(Outgoing::Diagnostics(_, first)) = rx.try_recv() else {
            panic!("expected diagnostics");
        };
        assert_eq!(first.len(), 1);
        let Ok(Outgoing::Diagnostics(cleared_uri, cleared)) = rx.try_recv() else {
            panic!("expected the clear");
        };
        assert_eq!(cleared_uri, uri);
        assert!(cleared.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_document_ignores_late_results() {
        let (presenter, mut rx) = open_presenter();
        presenter.close(Url::parse(URI).expect("valid uri"));
        assert!(rx.try_recv().is_ok());

        presenter.findings(URI, &validate("Fix it."));
        presenter.annotations(URI, 2, ticket_hint());

        assert!(rx.try_recv().is_err(), "nothing published after close");
        let documents = lock(&presenter.documents);
        assert!(documents.annotations.is_empty());
        assert!(documents.text.is_empty());
    }

    #[test]
    fn open_document_records_annotations() {
        let (presenter, mut rx) = open_presenter();
        presenter.annotations(URI, 2, ticket_hint());
        assert!(matches!(rx.try_recv(), Ok(Outgoing::RefreshHints)));

        presenter.annotations(URI, 2, Arc::from(Vec::new()));
        assert!(matches!(rx.try_recv(), Ok(Outgoing::RefreshHints)));
        let documents = lock(&presenter.documents);
        assert!(documents.annotations[URI].is_empty());
    }

    #[test]
    fn hint_label_joins_in_order() {
        let annotation = |text: &str, status| Annotation {
            start: 0,
            end: 1,
            kind: trailcheck_core::EntityKind::Ticket,
            identifier: "1".to_string(),
            text: text.to_string(),
            status,
        };
        let label = hint_label(&[
            annotation("Fix bug", AnnotationStatus::Valid),
            annotation("Ticket #2 not found", AnnotationStatus::Invalid),
        ]);
        assert_eq!(label, "✓ Fix bug  ✗ Ticket #2 not found");
    }
}
