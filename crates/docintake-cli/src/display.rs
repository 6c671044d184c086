//! Plain-text rendering of documents, batch reports and review details.

use tokio::sync::broadcast::{self, error::RecvError};

use docintake::pipeline::{BatchReport, DocumentEvent};
use docintake::{sanitize, Document, ProcessingResult, RejectedFile, ReviewDetail};

const ID_WIDTH: usize = 36;

pub fn print_documents(documents: &[Document]) {
    if documents.is_empty() {
        println!("no documents");
        return;
    }

    println!(
        "{:<ID_WIDTH$}  {:<12}  {:>10}  {}",
        "ID", "STATUS", "CONFIDENCE", "FILE"
    );
    for doc in documents {
        println!(
            "{:<ID_WIDTH$}  {:<12}  {:>10}  {}",
            doc.id,
            doc.status,
            confidence(doc.overall_confidence),
            doc.filename
        );
    }
}

pub fn print_result(id: &str, result: &ProcessingResult) {
    match result.status() {
        Some(status) => println!("{}: {} ({})", id, status, confidence(result.overall_confidence())),
        None => println!("{}: not processed", id),
    }
    for field in result.fields() {
        println!("  {:<16} {:<32} {:.2}", field.name, field.value, field.confidence);
    }
    for error in result.errors() {
        println!("  error [{}] during {}: {}", error.kind, error.stage, error.message);
    }
}

pub fn print_batch_report(report: &BatchReport) {
    for outcome in &report.outcomes {
        let status = outcome
            .result
            .status()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<ID_WIDTH$}  {:<12}  {:>10}  {}",
            outcome.document_id,
            status,
            confidence(outcome.result.overall_confidence()),
            outcome.filename
        );
    }

    println!(
        "\n{} attempted, {} succeeded, {} failed",
        report.attempted(),
        report.succeeded(),
        report.failed()
    );
    for error in report.result.errors() {
        println!(
            "  {} [{}] during {}: {}",
            error.filename.as_deref().unwrap_or("?"),
            error.kind,
            error.stage,
            error.message
        );
    }
}

pub fn print_rejected(rejected: &[RejectedFile]) {
    if rejected.is_empty() {
        return;
    }
    eprintln!("{} file(s) not registered:", rejected.len());
    for file in rejected {
        eprintln!("  {}: {}", sanitize::redact_path(&file.path), file.error);
    }
}

pub fn print_detail(detail: &ReviewDetail) {
    let doc = &detail.document;
    println!("id:          {}", doc.id);
    println!("file:        {}", doc.filename);
    println!("status:      {}", doc.status);
    match detail.overall_level {
        Some(level) => println!("confidence:  {} ({})", confidence(doc.overall_confidence), level),
        None => println!("confidence:  {}", confidence(doc.overall_confidence)),
    }
    if let Some(ref batch) = doc.batch_id {
        println!("batch:       {}", batch);
    }
    if let Some(ref error) = doc.last_error {
        println!("last error:  {}", error);
    }

    println!("\nfields:");
    if detail.fields.is_empty() {
        println!("  (none)");
    }
    for field in &detail.fields {
        println!(
            "  {:<16} {:<32} {:.2} {:<6}  {}",
            field.name,
            field.value,
            field.confidence,
            field.confidence_level(),
            field.region.as_deref().unwrap_or("")
        );
    }

    if let Some(ref log) = detail.last_log {
        println!(
            "\nlast log:    {} -> {} after {} ms: {}",
            log.stage, log.outcome, log.duration_ms, log.message
        );
    }
}

/// Prints events until every sender is dropped.
pub fn print_events(mut receiver: broadcast::Receiver<DocumentEvent>) {
    loop {
        match receiver.blocking_recv() {
            Ok(event) => eprintln!("[{}] {}: {}", event.filename, event.status, event.message),
            Err(RecvError::Lagged(skipped)) => eprintln!("({} progress events skipped)", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

fn confidence(value: Option<f64>) -> String {
    value
        .map(|c| format!("{:.2}", c))
        .unwrap_or_else(|| "-".to_string())
}
