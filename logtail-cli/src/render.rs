use std::io::{self, Write};

use chrono::Local;
use clap::ValueEnum;
use colored::*;
use logtail_engine::Sink;
use logtail_protocol::logs::{Category, HttpFields, Payload, Record};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Local time, category and message.
    Short,
    /// Message only.
    Raw,
}

/// Prints records to a terminal or any other writer.
pub struct TerminalSink<W> {
    writer: W,
    format: OutputFormat,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write> TerminalSink<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self { writer, format }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Sink for TerminalSink<W> {
    fn render(&mut self, record: &Record) {
        let line = format_record(record, self.format);
        if let Err(err) = writeln!(self.writer, "{line}").and_then(|_| self.writer.flush()) {
            debug!(?err, "falha ao escrever registro");
        }
    }
}

pub fn format_record(record: &Record, format: OutputFormat) -> String {
    match format {
        OutputFormat::Raw => message(record),
        OutputFormat::Short => {
            let time = record
                .timestamp
                .with_timezone(&Local)
                .format("%H:%M:%S%.3f")
                .to_string();
            let mut line = format!("{} {}", time.dimmed(), tag(record.category));
            if let Some(instance) = &record.instance_id {
                let short: String = instance.chars().take(8).collect();
                line.push(' ');
                line.push_str(&format!("[{short}]").dimmed().to_string());
            }
            line.push(' ');
            line.push_str(&message(record));
            line
        }
    }
}

fn tag(category: Category) -> ColoredString {
    let label = format!("{:<8}", category.as_str());
    match category {
        Category::Stderr => label.red(),
        Category::Exit => label.yellow(),
        Category::Request | Category::Response => label.cyan(),
        Category::Command => label.bold(),
        Category::Stdout | Category::Other => label.normal(),
    }
}

fn message(record: &Record) -> String {
    match &record.payload {
        Payload::Text(text) => text.trim_end_matches('\n').to_string(),
        Payload::Http(fields) => http_summary(fields),
    }
}

fn http_summary(fields: &HttpFields) -> String {
    let method = fields.method.as_deref().unwrap_or("-");
    let status = fields
        .status_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "-".to_string());
    let path = fields.path.as_deref().unwrap_or("/");
    let mut summary = format!("{method} {status} {path}");
    if let Some(duration) = fields.duration_ms {
        summary.push_str(&format!(" {duration}ms"));
    }
    summary
}
