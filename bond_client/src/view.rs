//! Console view: renders view updates and parses operator commands.
use std::thread::{self, JoinHandle};

use bond_common::instruments;
use crossbeam_channel::Receiver;

use crate::model::state::ViewUpdate;

/// A line typed by the operator.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewCommand {
    /// Subscribe; `None` means the configured instrument list.
    Send(Option<Vec<String>>),
    /// Print the connection status.
    Status,
    /// Reprint the whole message log.
    Log,
    /// Leave the monitor.
    Quit,
    /// Anything else.
    Unknown(String),
}

impl ViewCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let (word, rest) = trimmed
            .split_once(char::is_whitespace)
            .map(|(word, rest)| (word, rest.trim()))
            .unwrap_or((trimmed, ""));
        match word.to_ascii_lowercase().as_str() {
            "" => Self::Send(None),
            "send" if rest.is_empty() => Self::Send(None),
            "send" => Self::Send(Some(instruments::parse_list(rest))),
            "status" => Self::Status,
            "log" => Self::Log,
            "quit" | "exit" => Self::Quit,
            _ => Self::Unknown(trimmed.to_string()),
        }
    }
}

/// Display lines for one update.
pub fn render(update: &ViewUpdate) -> Vec<String> {
    match update {
        ViewUpdate::Status(status) => vec![format!("Connection status: {}", status)],
        ViewUpdate::Appended(lines) => lines.clone(),
        ViewUpdate::RequestFailed { request, cause } => {
            vec![format!("{} failed: {}", request, cause)]
        }
    }
}

/// Print every update received on `updates` until the state is dropped.
pub fn spawn_renderer(updates: Receiver<ViewUpdate>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("console-view".to_string())
        .spawn(move || {
            for update in updates.iter() {
                for line in render(&update) {
                    println!("{}", line);
                }
            }
        })
}

/// Short help printed at start-up.
pub fn usage() -> &'static str {
    "Commands: <enter> or `send` subscribes to the configured instruments, \
     `send A,B` subscribes to A and B, `status`, `log`, `quit`."
}
