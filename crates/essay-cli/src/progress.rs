//! Terminal feedback while stages run

use std::io::{stdout, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use revision_loop::{Snapshot, Stage};
use tokio::time::interval;

// ANSI escape codes
const CLEAR_LINE: &str = "\x1b[2K\r";
const HIDE_CURSOR: &str = "\x1b[?25l";
const SHOW_CURSOR: &str = "\x1b[?25h";
const CYAN: &str = "\x1b[96m";
const GREEN: &str = "\x1b[92m";
const RED: &str = "\x1b[91m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const ASCII_SPINNER: &[&str] = &["|", "/", "-", "\\"];

/// Spinner shown on stderr while a stage is waiting on the model or search
pub struct Spinner {
    message: String,
    is_running: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
    use_unicode: bool,
    enabled: bool,
}

impl Spinner {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_running: Arc::new(AtomicBool::new(false)),
            handle: None,
            use_unicode: supports_unicode(),
            enabled: std::io::stderr().is_terminal(),
        }
    }

    pub fn start(&mut self) {
        if !self.enabled || self.is_running.load(Ordering::SeqCst) {
            return;
        }

        self.is_running.store(true, Ordering::SeqCst);

        let is_running = self.is_running.clone();
        let message = self.message.clone();
        let frames = if self.use_unicode {
            SPINNER_FRAMES
        } else {
            ASCII_SPINNER
        };

        self.handle = Some(tokio::spawn(async move {
            let mut idx = 0;
            let mut tick = interval(Duration::from_millis(80));
            let mut err = std::io::stderr();

            let _ = write!(err, "{}", HIDE_CURSOR);
            while is_running.load(Ordering::SeqCst) {
                let _ = write!(err, "{}{}{} {}{}", CLEAR_LINE, CYAN, frames[idx], message, RESET);
                let _ = err.flush();
                idx = (idx + 1) % frames.len();
                tick.tick().await;
            }
            let _ = write!(err, "{}{}", CLEAR_LINE, SHOW_CURSOR);
            let _ = err.flush();
        }));
    }

    pub async fn stop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        if self.enabled {
            let _ = write!(std::io::stderr(), "{}", SHOW_CURSOR);
        }
    }
}

/// What the spinner says while a stage runs
pub fn stage_activity(stage: Stage, revision_number: i64) -> String {
    match stage {
        Stage::Planning => "Writing outline...".to_string(),
        Stage::ResearchingTask => "Researching the task...".to_string(),
        Stage::Drafting => format!("Writing draft (revision {})...", revision_number),
        Stage::Reflecting => "Critiquing draft...".to_string(),
        Stage::ResearchingCritique => "Researching the critique...".to_string(),
        Stage::Terminal => "Done".to_string(),
    }
}

/// One line per completed transition
pub fn snapshot_line(snapshot: &Snapshot) -> String {
    let state = &snapshot.state;
    format!(
        "{}✓{} {:<21} {}→ {:<21} rev {}/{}  notes {}{}",
        GREEN,
        RESET,
        snapshot.completed.to_string(),
        DIM,
        snapshot.next.to_string(),
        state.revision_number(),
        state.max_revisions(),
        state.research_notes().len(),
        RESET
    )
}

pub fn print_failure(stage: Stage, error: &impl std::fmt::Display) {
    eprintln!("{}✗ {} failed:{} {}", RED, stage, RESET, error);
}

/// Flush helper for interleaving stdout with the stderr spinner
pub fn flush_stdout() {
    let _ = stdout().flush();
}

fn supports_unicode() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term.contains("xterm") || term.contains("256color") || term.contains("kitty") {
            return true;
        }
    }

    for var in &["LC_ALL", "LC_CTYPE", "LANG"] {
        if let Ok(val) = std::env::var(var) {
            if val.to_lowercase().contains("utf") {
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use revision_loop::{RunInput, TaskState};

    #[test]
    fn test_stage_activity_mentions_revision() {
        assert_eq!(stage_activity(Stage::Drafting, 2), "Writing draft (revision 2)...");
        assert_eq!(stage_activity(Stage::Planning, 1), "Writing outline...");
    }

    #[test]
    fn test_snapshot_line() {
        let snapshot = Snapshot {
            run_id: "r".to_string(),
            completed: Stage::Drafting,
            next: Stage::Reflecting,
            state: TaskState::new(RunInput::new("t")),
        };
        let line = snapshot_line(&snapshot);
        assert!(line.contains("drafting"));
        assert!(line.contains("reflecting"));
        assert!(line.contains("rev 1/2"));
    }

    #[tokio::test]
    async fn test_spinner_basic() {
        let mut spinner = Spinner::new("Testing");
        spinner.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        spinner.stop().await;
    }
}
