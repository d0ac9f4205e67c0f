//! Long help additions: per-command examples and the environment variable list.

use std::fmt::Write;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{ColorChoice, Command};

use crate::commands::{environment, migration, status};
use crate::theme::{MARKS, PALETTE, paint, paint_bold};

/// A titled set of sample invocations.
pub struct ExampleGroup {
    pub title: &'static str,
    pub commands: &'static [&'static str],
}

const EXAMPLES: &[(&str, &[ExampleGroup])] = &[
    ("migration", migration::EXAMPLES),
    ("environment", environment::EXAMPLES),
    ("status", status::EXAMPLES),
];

const ENVIRONMENT_VARIABLES: &[(&str, &str)] = &[
    ("CMS_MIGRATE_BASE_URL", "Override the Management API base URL"),
    ("REDIS_URL", "Redis URL, when cms-migrate.toml sets url = \"${REDIS_URL}\""),
    ("RUST_LOG", "Log filter (defaults to warn, or debug with --verbose)"),
];

/// Add the help appendices and styles to the generated command.
pub fn decorate(command: Command, color: bool) -> Command {
    let mut command = command
        .styles(styles())
        .color(if color { ColorChoice::Auto } else { ColorChoice::Never })
        .after_long_help(appendix(color));

    for (name, groups) in EXAMPLES {
        command = command.mut_subcommand(*name, |sub| sub.after_long_help(examples(groups, color)));
    }

    command
}

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default().bold())
        .usage(AnsiColor::BrightBlue.on_default().bold())
        .literal(AnsiColor::Magenta.on_default())
        .placeholder(AnsiColor::BrightBlack.on_default())
        .error(AnsiColor::Red.on_default().bold())
        .valid(AnsiColor::Green.on_default())
        .invalid(AnsiColor::Yellow.on_default())
}

fn examples(groups: &[ExampleGroup], color: bool) -> String {
    let mut text = paint_bold("Examples:", PALETTE.note, color);
    for group in groups {
        let _ = write!(text, "\n  {}\n", paint_bold(group.title, PALETTE.heading, color));
        for command in group.commands {
            let prompt = paint(MARKS.prompt, PALETTE.dim, color);
            let _ = writeln!(text, "    {prompt} {}", paint(command, PALETTE.command, color));
        }
    }
    text
}

fn appendix(color: bool) -> String {
    let mut text = paint_bold("Environment Variables:", PALETTE.note, color);
    text.push('\n');
    for (name, purpose) in ENVIRONMENT_VARIABLES {
        let _ = writeln!(text, "  {}  {purpose}", paint(&format!("{name:<22}"), PALETTE.label, color));
    }
    text.push_str("\nRun 'cms-migrate <command> --help' for examples of each command.");
    text
}
