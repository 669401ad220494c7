use std::fmt::Write as FmtWrite;

use console::style;
use serde::Serialize;

use crate::models::{AnswerResult, AnswerStatus, OutputFormat};
use crate::services::{IndexInfo, IngestReport};

pub trait Formatter {
    fn format_answer(&self, question: &str, result: &AnswerResult, show_sources: bool) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_ingest_report(&self, report: &IngestReport, dry_run: bool) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub documents_dir: String,
    pub pdf_count: usize,
    pub index_dir: String,
    /// `None` when no index has been built yet.
    pub index: Option<IndexInfo>,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub generation_model: String,
}

const PREVIEW_CHARS: usize = 200;

fn preview(text: &str) -> String {
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        format!("{head}...")
    } else {
        head
    }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_answer(&self, _question: &str, result: &AnswerResult, show_sources: bool) -> String {
        let mut output = String::new();
        match result.status {
            AnswerStatus::Answered => {
                writeln!(output, "{}", style("Answer").bold().green()).unwrap();
            }
            AnswerStatus::Degraded(_) => {
                writeln!(output, "{}", style("Answer (degraded)").bold().yellow()).unwrap();
            }
        }
        writeln!(output, "{}", result.answer).unwrap();

        if show_sources && !result.sources.is_empty() {
            writeln!(output).unwrap();
            writeln!(output, "{}", style("Sources").bold()).unwrap();
            for (i, source) in result.sources.iter().enumerate() {
                writeln!(
                    output,
                    "{}. [Score: {:.3}] {}",
                    i + 1,
                    source.score,
                    style(source.chunk.citation()).cyan()
                )
                .unwrap();
                for line in preview(&source.chunk.text).lines() {
                    writeln!(output, "   {line}").unwrap();
                }
            }
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();
        writeln!(
            output,
            "Documents:     {} ({} PDFs)",
            status.documents_dir, status.pdf_count
        )
        .unwrap();

        match &status.index {
            Some(info) => {
                writeln!(
                    output,
                    "Index:         {} {}",
                    status.index_dir,
                    style("[READY]").green()
                )
                .unwrap();
                writeln!(output, "  Chunks:      {}", info.chunk_count).unwrap();
                writeln!(
                    output,
                    "  Built with:  {} ({} dims)",
                    info.embedding_model, info.dimension
                )
                .unwrap();
                writeln!(output, "  Created:     {}", info.created_at).unwrap();
            }
            None => {
                writeln!(
                    output,
                    "Index:         {} {}",
                    status.index_dir,
                    style("[MISSING]").red()
                )
                .unwrap();
            }
        }

        writeln!(
            output,
            "Embedding:     {} ({})",
            status.embedding_model, status.embedding_provider
        )
        .unwrap();
        writeln!(output, "Generation:    {}", status.generation_model).unwrap();
        output
    }

    fn format_ingest_report(&self, report: &IngestReport, dry_run: bool) -> String {
        let mut output = String::new();
        let title = if dry_run { "Dry Run" } else { "Ingestion Complete" };
        writeln!(output, "{title}").unwrap();
        writeln!(output, "{}", "-".repeat(title.len())).unwrap();
        writeln!(output, "Files scanned: {}", report.files_scanned).unwrap();
        writeln!(output, "Files loaded:  {}", report.files_loaded).unwrap();
        writeln!(output, "Pages:         {}", report.pages).unwrap();
        if report.blank_pages > 0 {
            writeln!(output, "Blank pages:   {}", report.blank_pages).unwrap();
        }
        writeln!(output, "Chunks:        {}", report.chunks).unwrap();
        if let Some(build) = &report.build {
            writeln!(output, "Embedded:      {}", build.embedded).unwrap();
            writeln!(output, "Already saved: {}", build.skipped).unwrap();
            writeln!(output, "Pruned:        {}", build.pruned).unwrap();
        }
        for failure in &report.failures {
            writeln!(output, "{} {}", style("warning:").yellow(), failure).unwrap();
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("{} {}\n", style("Error:").red().bold(), error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render(&self, value: &serde_json::Value) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

impl Formatter for JsonFormatter {
    fn format_answer(&self, question: &str, result: &AnswerResult, show_sources: bool) -> String {
        let mut json = serde_json::json!({
            "question": question,
            "answer": result.answer,
            "status": result.status,
        });
        if show_sources {
            json["sources"] = serde_json::json!(result.sources);
        }
        self.render(&json)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(&serde_json::json!(status))
    }

    fn format_ingest_report(&self, report: &IngestReport, dry_run: bool) -> String {
        self.render(&serde_json::json!({
            "dry_run": dry_run,
            "report": report,
        }))
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_answer(&self, question: &str, result: &AnswerResult, show_sources: bool) -> String {
        let mut output = String::new();
        writeln!(output, "## {}\n", question).unwrap();
        if result.is_degraded() {
            writeln!(output, "> ⚠️ {}\n", result.answer).unwrap();
        } else {
            writeln!(output, "{}\n", result.answer).unwrap();
        }

        if show_sources && !result.sources.is_empty() {
            writeln!(output, "### Sources\n").unwrap();
            for (i, source) in result.sources.iter().enumerate() {
                writeln!(
                    output,
                    "{}. `{}` (score {:.3})",
                    i + 1,
                    source.chunk.citation(),
                    source.score
                )
                .unwrap();
            }
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "## Status\n").unwrap();
        writeln!(
            output,
            "- **Documents:** `{}` ({} PDFs)",
            status.documents_dir, status.pdf_count
        )
        .unwrap();
        match &status.index {
            Some(info) => {
                writeln!(output, "- **Index:** `{}` ✅", status.index_dir).unwrap();
                writeln!(output, "- **Chunks:** {}", info.chunk_count).unwrap();
                writeln!(
                    output,
                    "- **Built with:** {} ({} dims)",
                    info.embedding_model, info.dimension
                )
                .unwrap();
            }
            None => {
                writeln!(output, "- **Index:** `{}` ❌", status.index_dir).unwrap();
            }
        }
        writeln!(
            output,
            "- **Embedding:** {} ({})",
            status.embedding_model, status.embedding_provider
        )
        .unwrap();
        writeln!(output, "- **Generation:** {}", status.generation_model).unwrap();
        output
    }

    fn format_ingest_report(&self, report: &IngestReport, dry_run: bool) -> String {
        let mut output = String::new();
        let title = if dry_run { "Dry Run" } else { "Ingestion Complete" };
        writeln!(output, "## {title}\n").unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Files scanned | {} |", report.files_scanned).unwrap();
        writeln!(output, "| Files loaded | {} |", report.files_loaded).unwrap();
        writeln!(output, "| Pages | {} |", report.pages).unwrap();
        writeln!(output, "| Blank pages | {} |", report.blank_pages).unwrap();
        writeln!(output, "| Chunks | {} |", report.chunks).unwrap();
        if let Some(build) = &report.build {
            writeln!(output, "| Embedded | {} |", build.embedded).unwrap();
            writeln!(output, "| Already saved | {} |", build.skipped).unwrap();
            writeln!(output, "| Pruned | {} |", build.pruned).unwrap();
        }
        if !report.failures.is_empty() {
            writeln!(output, "\n### Skipped files\n").unwrap();
            for failure in &report.failures {
                writeln!(output, "- {}", failure).unwrap();
            }
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}
