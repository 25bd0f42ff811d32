use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

enum GuideLine {
    Command(String, String),
    Status(String, String),
    Text(String),
    Hint(String, String),
    Blank,
}

/// A titled block of help lines printed with a left guide bar.
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

    pub fn text(mut self, text: &str) -> Self {
        self.lines.push(GuideLine::Text(text.to_string()));
        self
    }

    pub fn hint(mut self, example: &str, note: &str) -> Self {
        self.lines
            .push(GuideLine::Hint(example.to_string(), note.to_string()));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(GuideLine::Blank);
        self
    }

    pub fn print(&self) {
        println!();
        println!("{} {}", style("◆").cyan(), style(&self.title).bold());
        let width = self
            .lines
            .iter()
            .filter_map(|l| match l {
                GuideLine::Command(name, _) => Some(name.len()),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        for line in &self.lines {
            match line {
                GuideLine::Command(name, description) => println!(
                    "{}  {:width$}  {}",
                    style("│").dim(),
                    style(name).green(),
                    style(description).dim(),
                    width = width
                ),
                GuideLine::Status(label, value) => {
                    println!("{}  {}: {}", style("│").dim(), style(label).bold(), value)
                }
                GuideLine::Text(text) => println!("{}  {}", style("│").dim(), text),
                GuideLine::Hint(example, note) if note.is_empty() => {
                    println!("{}  $ {}", style("│").dim(), style(example).cyan())
                }
                GuideLine::Hint(example, note) => println!(
                    "{}  $ {}  {}",
                    style("│").dim(),
                    style(example).cyan(),
                    style(note).dim()
                ),
                GuideLine::Blank => guide_bar(),
            }
        }
    }
}

fn guide_bar() {
    println!("{}", style("│").dim());
}

pub fn print_banner() {
    let lines: &[&str] = &[
        "       _   _                __ _               ",
        "  ___ | |_| |__   ___ _ __ / _| | _____      __",
        " / _ \\| __| '_ \\ / _ \\ '__| |_| |/ _ \\ \\ /\\ / /",
        "|  __/| |_| | | |  __/ |  |  _| | (_) \\ V  V / ",
        " \\___| \\__|_| |_|\\___|_|  |_| |_|\\___/ \\_/\\_/  ",
    ];

    // Gradient: amber → coral → violet, diagonal.
    let stops: [(u8, u8, u8); 3] = [(251, 191, 36), (248, 113, 113), (167, 139, 250)];
    let max_w = 48u32;
    let max_d = max_w + 4 * 10;

    println!();
    for (y, line) in lines.iter().enumerate() {
        for (x, ch) in line.chars().enumerate() {
            if ch == ' ' {
                print!(" ");
                continue;
            }
            let d = ((x as u32 + y as u32 * 10) * 1000 / max_d).min(1000);
            let (r, g, b) = if d <= 500 {
                lerp_color(stops[0], stops[1], d * 2)
            } else {
                lerp_color(stops[1], stops[2], (d - 500) * 2)
            };
            print!("\x1b[38;2;{};{};{}m{}", r, g, b, ch);
        }
        println!();
    }
    print!("\x1b[0m");

    println!("\x1b[38;2;167;139;250mFrom client brief to finished script.\x1b[0m\n");
}

fn lerp_color(a: (u8, u8, u8), b: (u8, u8, u8), t: u32) -> (u8, u8, u8) {
    let r = (a.0 as u32 * (1000 - t) + b.0 as u32 * t) / 1000;
    let g = (a.1 as u32 * (1000 - t) + b.1 as u32 * t) / 1000;
    let b_val = (a.2 as u32 * (1000 - t) + b.2 as u32 * t) / 1000;
    (r as u8, g as u8, b_val as u8)
}

pub fn print_goodbye() {
    println!("\n{} {}", SPARKLE, style("See you next brief!").bold().cyan());
}
