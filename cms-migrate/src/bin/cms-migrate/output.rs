//! Terminal rendering: status lines, unit progress, run summaries and views.

use std::io::{IsTerminal, Write};

use anyhow::Result;
use clap::ValueEnum;
use cms_migrate::{FailureDetail, RunReport, UnitReport};
use colored::Color;
use comfy_table::{Attribute, Cell, Color as TableColor, Table, presets};
use serde::Serialize;

use crate::theme::{MARKS, PALETTE, paint, paint_bold};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Text and tables
    #[default]
    Table,
    /// JSON documents for scripts
    Json,
    /// One line per item
    Compact,
}

/// Flags shared by every subcommand.
#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub output_format: OutputFormat,
    pub quiet: bool,
    pub verbose: bool,
    pub no_color: bool,
}

/// A listing that can be shown as a table, one line per item or JSON.
pub trait View: Serialize {
    fn headers(&self) -> &'static [&'static str];

    /// Table rows. `colored` is false under `--no-color`.
    fn rows(&self, colored: bool) -> Vec<Vec<Cell>>;

    fn lines(&self) -> Vec<String>;

    /// Shown in place of rows when there are none.
    fn placeholder(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Passed,
    Failed,
    Warning,
    Note,
}

impl Tone {
    fn mark(self) -> &'static str {
        match self {
            Tone::Passed => MARKS.passed,
            Tone::Failed => MARKS.failed,
            Tone::Warning => MARKS.warning,
            Tone::Note => MARKS.note,
        }
    }

    fn color(self) -> Color {
        match self {
            Tone::Passed => PALETTE.passed,
            Tone::Failed => PALETTE.failed,
            Tone::Warning => PALETTE.warning,
            Tone::Note => PALETTE.note,
        }
    }
}

/// `name: message (error code n)` followed by one line per validation issue.
pub fn describe_failure(name: &str, detail: &FailureDetail) -> Vec<String> {
    let mut lines = vec![format!("{name}: {detail}")];
    lines.extend(
        detail
            .validation_errors
            .iter()
            .map(|issue| format!("    {} {issue}", MARKS.issue)),
    );
    lines
}

/// Closing lines of a batch, most important last.
pub fn summary_lines(report: &RunReport) -> Vec<(Tone, String)> {
    let mut lines = Vec::new();

    if report.planned == 0 {
        lines.push((Tone::Note, format!("No migrations to {}", report.operation)));
    }
    if !report.skipped.is_empty() {
        lines.push((Tone::Note, format!("{} migration(s) already executed", report.skipped.len())));
    }
    for unit in report.failures() {
        if let Some(detail) = unit.outcome.failure() {
            lines.push((Tone::Failed, format!("{}: {detail}", unit.name)));
        }
    }

    let summary = report.summary();
    lines.push(if report.succeeded() {
        (Tone::Passed, summary)
    } else if report.stopped_early {
        (Tone::Failed, format!("Stopped after the first failure, {summary}"))
    } else {
        (Tone::Warning, summary)
    });

    lines
}

#[derive(Clone)]
pub struct OutputManager {
    pub options: GlobalOptions,
}

impl OutputManager {
    pub fn new(options: GlobalOptions) -> Self {
        Self { options }
    }

    pub fn is_json(&self) -> bool {
        self.options.output_format == OutputFormat::Json
    }

    fn colored(&self) -> bool {
        !self.options.no_color
    }

    /// Human-readable text is dropped under `--quiet` and JSON output.
    fn speaks(&self) -> bool {
        !self.options.quiet && !self.is_json()
    }

    fn shows_progress(&self) -> bool {
        self.speaks() && self.options.output_format == OutputFormat::Table && std::io::stdout().is_terminal()
    }

    fn format_line(&self, tone: Tone, message: &str) -> String {
        format!("{} {message}", paint(tone.mark(), tone.color(), self.colored()))
    }

    /// Failures always reach stderr; everything else respects `--quiet`.
    pub fn say(&self, tone: Tone, message: &str) {
        if tone == Tone::Failed {
            eprintln!("{}", self.format_line(tone, message));
        } else if self.speaks() {
            println!("{}", self.format_line(tone, message));
        }
    }

    pub fn success(&self, message: &str) {
        self.say(Tone::Passed, message);
    }

    pub fn error(&self, message: &str) {
        self.say(Tone::Failed, message);
    }

    pub fn warning(&self, message: &str) {
        self.say(Tone::Warning, message);
    }

    pub fn note(&self, message: &str) {
        self.say(Tone::Note, message);
    }

    pub fn heading(&self, title: &str) {
        if self.speaks() {
            println!("\n{}", paint_bold(title, PALETTE.heading, self.colored()));
        }
    }

    /// Indented `label  value` line under a heading.
    pub fn field(&self, label: &str, value: &str) {
        if self.speaks() {
            println!("  {}{value}", paint(&format!("{label:<16}"), PALETTE.label, self.colored()));
        }
    }

    pub fn unit_skipped(&self, name: &str) {
        self.note(&format!("Skipping already executed migration {name}"));
    }

    pub fn unit_started(&self, position: usize, total: usize, name: &str) {
        if self.shows_progress() {
            let mark = paint(MARKS.running, PALETTE.running, self.colored());
            print!("\r{mark} [{position}/{total}] {name}");
            std::io::stdout().flush().ok();
        }
    }

    pub fn unit_finished(&self, unit: &UnitReport) {
        if self.shows_progress() {
            // Erase the progress line before the result replaces it.
            print!("\r\x1b[2K");
            std::io::stdout().flush().ok();
        }

        match unit.outcome.failure() {
            None => self.success(&unit.name),
            Some(detail) => {
                let mut lines = describe_failure(&unit.name, detail).into_iter();
                if let Some(first) = lines.next() {
                    self.error(&first);
                }
                for issue in lines {
                    eprintln!("{}", paint(&issue, PALETTE.dim, self.colored()));
                }
            }
        }
    }

    pub fn run_summary(&self, report: &RunReport) {
        self.heading("Summary");
        for (tone, line) in summary_lines(report) {
            self.say(tone, &line);
        }
    }

    pub fn json<T: Serialize + ?Sized>(&self, data: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(data)?);
        Ok(())
    }

    pub fn show<V: View>(&self, view: &V) -> Result<()> {
        match self.options.output_format {
            OutputFormat::Json => self.json(view),
            _ if self.options.quiet => Ok(()),
            OutputFormat::Compact => {
                for line in view.lines() {
                    println!("{line}");
                }
                Ok(())
            }
            OutputFormat::Table => {
                println!("{}", self.table(view));
                Ok(())
            }
        }
    }

    pub fn table<V: View>(&self, view: &V) -> Table {
        let colored = self.colored();
        let mut table = Table::new();
        table.load_preset(if colored {
            presets::UTF8_FULL_CONDENSED
        } else {
            presets::ASCII_MARKDOWN
        });

        let header: Vec<Cell> = view
            .headers()
            .iter()
            .map(|title| {
                let cell = Cell::new(title).add_attribute(Attribute::Bold);
                if colored { cell.fg(TableColor::Cyan) } else { cell }
            })
            .collect();
        table.set_header(header);

        let rows = view.rows(colored);
        if rows.is_empty() {
            table.add_row(vec![Cell::new(view.placeholder())]);
        }
        for row in rows {
            table.add_row(row);
        }

        table
    }
}
