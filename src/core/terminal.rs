use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

enum GuideLine {
    Command(String, String),
    Status(String, String),
    Info(String),
    Blank,
}

/// A titled block of aligned terminal lines, printed in one go.
pub struct GuideSection {
    title: String,
    lines: Vec<GuideLine>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.lines
            .push(GuideLine::Command(name.to_string(), description.to_string()));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.lines
            .push(GuideLine::Status(label.to_string(), value.to_string()));
        self
    }

    pub fn info(mut self, text: &str) -> Self {
        self.lines.push(GuideLine::Info(text.to_string()));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(GuideLine::Blank);
        self
    }

    pub fn print(self) {
        println!("\n{} {}", SPARKLE, style(&self.title).bold().cyan());
        let width = self
            .lines
            .iter()
            .map(|l| match l {
                GuideLine::Command(name, _) => name.len(),
                _ => 0,
            })
            .max()
            .unwrap_or(0);
        for line in &self.lines {
            match line {
                GuideLine::Command(name, description) => println!(
                    "  {}  {}",
                    style(format!("{:<width$}", name, width = width)).green(),
                    description
                ),
                GuideLine::Status(label, value) => {
                    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), value)
                }
                GuideLine::Info(text) => println!("  {} {}", INFO_ICON, style(text).blue()),
                GuideLine::Blank => println!(),
            }
        }
    }
}
