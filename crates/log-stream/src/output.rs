//! Arbitrated terminal output.
//!
//! The spinner and log lines share one terminal. Every write goes through
//! [`OutputArbiter`], which takes the spinner down before a line is printed
//! and, when its [`ProgressPolicy`] allows, puts it back afterwards.

use std::io::{IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Where arbitrated output ends up.
pub trait Terminal: Send + 'static {
    /// Prints one complete line.
    fn write_line(&mut self, line: &str);
    /// Shows the progress indicator with `message`, or updates it.
    fn show_progress(&mut self, message: &str);
    /// Removes the progress indicator, leaving no trace of it.
    fn hide_progress(&mut self);
}

/// Real terminal: lines on stdout, spinner on stderr.
#[derive(Default)]
pub struct ConsoleTerminal {
    spinner: Option<ProgressBar>,
}

impl ConsoleTerminal {
    pub fn new() -> Self {
        Self::default()
    }
}

fn spinner_bar() -> ProgressBar {
    if !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

impl Terminal for ConsoleTerminal {
    fn write_line(&mut self, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }

    fn show_progress(&mut self, message: &str) {
        self.spinner
            .get_or_insert_with(spinner_bar)
            .set_message(message.to_string());
    }

    fn hide_progress(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }
}

/// One operation observed by a [`RecordingTerminal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOp {
    Line(String),
    Progress(String),
    HideProgress,
}

/// Terminal that records operations instead of printing them.
#[derive(Debug, Clone, Default)]
pub struct RecordingTerminal {
    ops: Arc<Mutex<Vec<TerminalOp>>>,
}

impl RecordingTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<TerminalOp> {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Printed lines with styling stripped.
    pub fn lines(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                TerminalOp::Line(l) => Some(console::strip_ansi_codes(&l).into_owned()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, op: TerminalOp) {
        self.ops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(op);
    }
}

impl Terminal for RecordingTerminal {
    fn write_line(&mut self, line: &str) {
        self.push(TerminalOp::Line(line.to_string()));
    }

    fn show_progress(&mut self, message: &str) {
        self.push(TerminalOp::Progress(message.to_string()));
    }

    fn hide_progress(&mut self) {
        self.push(TerminalOp::HideProgress);
    }
}

/// Whether the spinner comes back after a line is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPolicy {
    /// Restart the spinner after each line (build logs).
    Resume,
    /// Once a line has been written the spinner stays down (runtime logs).
    Never,
}

struct ArbiterState {
    terminal: Box<dyn Terminal>,
    policy: ProgressPolicy,
    /// Message of the spinner currently on screen, if any.
    progress: Option<String>,
}

impl ArbiterState {
    fn hide(&mut self) -> Option<String> {
        let previous = self.progress.take();
        if previous.is_some() {
            self.terminal.hide_progress();
        }
        previous
    }

    fn show(&mut self, message: &str) {
        self.terminal.show_progress(message);
        self.progress = Some(message.to_string());
    }
}

/// Single writer for the terminal.
///
/// Clones share the same terminal. Every operation holds the lock for its
/// whole effect, so a spinner frame can never land in the middle of a line.
#[derive(Clone)]
pub struct OutputArbiter {
    state: Arc<Mutex<ArbiterState>>,
}

impl OutputArbiter {
    pub fn new(terminal: impl Terminal, policy: ProgressPolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(ArbiterState {
                terminal: Box::new(terminal),
                policy,
                progress: None,
            })),
        }
    }

    /// Arbiter over the real stdout/stderr.
    pub fn console(policy: ProgressPolicy) -> Self {
        Self::new(ConsoleTerminal::new(), policy)
    }

    /// Starts the spinner, or replaces its message.
    pub fn with_progress(&self, message: &str) {
        self.lock().show(message);
    }

    /// Writes a line. A running spinner is stopped first and, under
    /// [`ProgressPolicy::Resume`], restarted with its previous message.
    pub fn write_line(&self, line: &str) {
        let mut state = self.lock();
        let previous = state.hide();
        state.terminal.write_line(line);
        if state.policy == ProgressPolicy::Resume {
            if let Some(message) = previous {
                state.show(&message);
            }
        }
    }

    /// Writes a line, then (under [`ProgressPolicy::Resume`]) shows the
    /// spinner with `context` whether or not one was running before.
    pub fn log_line(&self, line: &str, context: &str) {
        let mut state = self.lock();
        state.hide();
        state.terminal.write_line(line);
        if state.policy == ProgressPolicy::Resume {
            state.show(context);
        }
    }

    /// Takes the spinner down for good.
    pub fn stop_progress(&self) {
        self.lock().hide();
    }

    pub fn is_progress_active(&self) -> bool {
        self.lock().progress.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, ArbiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_without_spinner_is_plain() {
        let term = RecordingTerminal::new();
        let out = OutputArbiter::new(term.clone(), ProgressPolicy::Resume);
        out.write_line("hello");
        assert_eq!(term.ops(), vec![TerminalOp::Line("hello".into())]);
    }

    #[test]
    fn write_line_hides_then_resumes_spinner() {
        let term = RecordingTerminal::new();
        let out = OutputArbiter::new(term.clone(), ProgressPolicy::Resume);
        out.with_progress("Building...");
        out.write_line("step 1");

        assert_eq!(
            term.ops(),
            vec![
                TerminalOp::Progress("Building...".into()),
                TerminalOp::HideProgress,
                TerminalOp::Line("step 1".into()),
                TerminalOp::Progress("Building...".into()),
            ]
        );
        assert!(out.is_progress_active());
    }

    #[test]
    fn log_line_resumes_with_context() {
        let term = RecordingTerminal::new();
        let out = OutputArbiter::new(term.clone(), ProgressPolicy::Resume);
        out.log_line("[info] npm ci", "npm ci");
        assert_eq!(
            term.ops(),
            vec![
                TerminalOp::Line("[info] npm ci".into()),
                TerminalOp::Progress("npm ci".into()),
            ]
        );
    }

    #[test]
    fn never_policy_leaves_spinner_down() {
        let term = RecordingTerminal::new();
        let out = OutputArbiter::new(term.clone(), ProgressPolicy::Never);
        out.with_progress("Connecting...");
        out.write_line("line");
        out.log_line("line 2", "ctx");

        assert!(!out.is_progress_active());
        assert_eq!(
            term.ops(),
            vec![
                TerminalOp::Progress("Connecting...".into()),
                TerminalOp::HideProgress,
                TerminalOp::Line("line".into()),
                TerminalOp::Line("line 2".into()),
            ]
        );
    }

    #[test]
    fn stop_progress_is_idempotent() {
        let term = RecordingTerminal::new();
        let out = OutputArbiter::new(term.clone(), ProgressPolicy::Resume);
        out.with_progress("x");
        out.stop_progress();
        out.stop_progress();
        assert_eq!(
            term.ops(),
            vec![TerminalOp::Progress("x".into()), TerminalOp::HideProgress]
        );
    }

    #[test]
    fn concurrent_writers_never_split_a_line() {
        let term = RecordingTerminal::new();
        let out = OutputArbiter::new(term.clone(), ProgressPolicy::Resume);
        out.with_progress("busy");

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let out = out.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        out.write_line(&format!("{i}-{j}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Every line is bracketed by hide/show of the spinner.
        let ops = term.ops();
        for (idx, op) in ops.iter().enumerate() {
            if let TerminalOp::Line(_) = op {
                assert_eq!(ops[idx - 1], TerminalOp::HideProgress);
                assert_eq!(ops[idx + 1], TerminalOp::Progress("busy".into()));
            }
        }
        assert_eq!(term.lines().len(), 200);
    }
}
