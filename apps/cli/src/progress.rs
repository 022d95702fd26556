//! Terminal rendering of deploy events.

use std::io::Write;

use chrono::{DateTime, Local};
use metaforce_deploy::DeployEvent;
use tokio::sync::mpsc;

const BAR_WIDTH: usize = 40;
const SUFFIXES: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human-readable size with one decimal, e.g. `1.5 MB`.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while unit < SUFFIXES.len() - 1 && (value / 1024.0).round_ties_even() >= 1.0 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", SUFFIXES[unit])
}

/// `[████░░░░] 50% 2.0 KB / 4.0 KB`. Byte counters are omitted when the
/// total is unknown.
pub fn render_bar(percent: u8, bytes: u64, total: u64) -> String {
    let percent = percent.min(100);
    let filled = BAR_WIDTH * usize::from(percent) / 100;
    let mut line = String::with_capacity(BAR_WIDTH * 3 + 32);
    line.push('[');
    line.extend(std::iter::repeat_n('█', filled));
    line.extend(std::iter::repeat_n('░', BAR_WIDTH - filled));
    line.push_str(&format!("] {percent}%"));
    if total > 0 {
        line.push_str(&format!(" {} / {}", format_bytes(bytes), format_bytes(total)));
    }
    line
}

/// Turns events into terminal output.
#[derive(Debug, Default)]
pub struct Renderer {
    json: bool,
    bar_active: bool,
}

impl Renderer {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            bar_active: false,
        }
    }

    /// Text to write for `event`, including any line control characters.
    pub fn render(&mut self, event: &DeployEvent, now: DateTime<Local>) -> String {
        if self.json {
            return match serde_json::to_string(event) {
                Ok(line) => line + "\n",
                Err(e) => format!("{{\"type\":\"error\",\"message\":\"{e}\"}}\n"),
            };
        }

        match event {
            DeployEvent::Status(status) => {
                let lead = if std::mem::take(&mut self.bar_active) {
                    "\n"
                } else {
                    ""
                };
                format!("{lead}[{}] {}\n", now.format("%H:%M:%S"), status.message)
            }
            DeployEvent::Progress(p) => {
                self.bar_active = true;
                format!(
                    "\r{}",
                    render_bar(p.percent, p.bytes_transferred, p.total_bytes)
                )
            }
        }
    }

    /// Output that closes a dangling progress line.
    pub fn finish(&mut self) -> &'static str {
        if std::mem::take(&mut self.bar_active) {
            "\n"
        } else {
            ""
        }
    }
}

/// Prints events to stdout until every sender is gone.
pub async fn print_events(mut events: mpsc::UnboundedReceiver<DeployEvent>, json: bool) {
    let mut renderer = Renderer::new(json);
    let mut stdout = std::io::stdout();
    while let Some(event) = events.recv().await {
        let text = renderer.render(&event, Local::now());
        if let Err(e) = stdout.write_all(text.as_bytes()).and_then(|()| stdout.flush()) {
            tracing::warn!(error = %e, "failed to write progress");
        }
    }
    let _ = stdout.write_all(renderer.finish().as_bytes());
    let _ = stdout.flush();
}
