use colored::{Color, Colorize};

/// Colors used for terminal output and help text.
pub struct Palette {
    pub heading: Color,
    pub passed: Color,
    pub failed: Color,
    pub warning: Color,
    pub note: Color,
    pub running: Color,
    pub dim: Color,
    pub label: Color,
    pub command: Color,
}

pub const PALETTE: Palette = Palette {
    heading: Color::BrightBlue,
    passed: Color::Green,
    failed: Color::Red,
    warning: Color::Yellow,
    note: Color::Cyan,
    running: Color::BrightCyan,
    dim: Color::BrightBlack,
    label: Color::BrightCyan,
    command: Color::Magenta,
};

/// Prefixes of a unit's progress and result lines.
pub struct Marks {
    pub passed: &'static str,
    pub failed: &'static str,
    pub warning: &'static str,
    pub note: &'static str,
    pub running: &'static str,
    pub issue: &'static str,
    pub prompt: &'static str,
}

pub const MARKS: Marks = Marks {
    passed: "✓",
    failed: "✗",
    warning: "!",
    note: "·",
    running: "▸",
    issue: "-",
    prompt: "$",
};

/// `text` in `color`, or unchanged when colors are off.
pub fn paint(text: &str, color: Color, enabled: bool) -> String {
    if enabled {
        text.color(color).to_string()
    } else {
        text.to_string()
    }
}

/// Bold variant of [`paint`].
pub fn paint_bold(text: &str, color: Color, enabled: bool) -> String {
    if enabled {
        text.color(color).bold().to_string()
    } else {
        text.to_string()
    }
}
