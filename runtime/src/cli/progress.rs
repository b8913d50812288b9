//! Terminal progress display for pipeline runs.
//!
//! Uses `indicatif` to show one line per phase: a spinner while the phase
//! has no known total, a bar once it does, and a completion marker when the
//! next phase starts.

use crate::pipeline::progress::{ProgressEvent, ProgressReporter, RunPhase};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

fn phase_label(phase: RunPhase) -> &'static str {
    match phase {
        RunPhase::Discovering => "Sitemap discovery",
        RunPhase::Learning => "Pattern learning",
        RunPhase::Filtering => "URL filtering",
        RunPhase::Extracting => "Extraction",
        RunPhase::Done => "Done",
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("  {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("\u{25b8}\u{25b9}\u{25b8}\u{25b9}\u{25b8}")
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("  {spinner:.blue} {msg:<22} [{bar:30.cyan/dim}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("\u{2588}\u{2589}\u{258a}\u{258b}\u{258c}\u{258d}\u{258e}\u{258f} ")
}

fn done_style() -> ProgressStyle {
    ProgressStyle::with_template("  {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Phase-by-phase progress lines on stderr.
pub struct PhaseProgress {
    multi: MultiProgress,
    current: Mutex<Option<(RunPhase, ProgressBar)>>,
}

impl Default for PhaseProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current: Mutex::new(None),
        }
    }

    /// Mark the running phase as complete.
    pub fn finish(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some((phase, bar)) = current.take() {
                mark_done(&bar, phase);
            }
        }
    }

    fn start_phase(&self, event: &ProgressEvent) -> ProgressBar {
        let bar = if event.total > 0 {
            let bar = self.multi.add(ProgressBar::new(event.total as u64));
            bar.set_style(bar_style());
            bar
        } else {
            let bar = self.multi.add(ProgressBar::new_spinner());
            bar.set_style(spinner_style());
            bar
        };
        bar.set_message(phase_label(event.phase));
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }
}

fn mark_done(bar: &ProgressBar, phase: RunPhase) {
    let detail = match bar.length() {
        Some(len) if len > 0 => format!("{}/{len}", bar.position()),
        _ => "done".to_string(),
    };
    bar.set_style(done_style());
    bar.finish_with_message(format!(
        "\x1b[32m\u{2713}\x1b[0m {:<22} \x1b[32m{detail}\x1b[0m",
        phase_label(phase)
    ));
}

impl ProgressReporter for PhaseProgress {
    fn report(&self, event: ProgressEvent) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };

        let same_phase = matches!(&*current, Some((phase, _)) if *phase == event.phase);
        if !same_phase {
            if let Some((phase, bar)) = current.take() {
                mark_done(&bar, phase);
            }
            if event.phase == RunPhase::Done {
                return;
            }
            *current = Some((event.phase, self.start_phase(&event)));
        }

        if let Some((_, bar)) = current.as_ref() {
            if event.total > 0 && bar.length() != Some(event.total as u64) {
                bar.set_length(event.total as u64);
                bar.set_style(bar_style());
            }
            bar.set_position(event.processed as u64);
        }
    }
}

/// Create a simple spinner for one-off operations.
pub fn create_spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(spinner_style());
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_switch_finishes_previous_bar() {
        let progress = PhaseProgress::new();
        progress.report(ProgressEvent::entered(RunPhase::Learning, 20));
        progress.report(ProgressEvent::new(RunPhase::Learning, 5, 20));
        {
            let current = progress.current.lock().unwrap();
            let (phase, bar) = current.as_ref().unwrap();
            assert_eq!(*phase, RunPhase::Learning);
            assert_eq!(bar.position(), 5);
        }

        progress.report(ProgressEvent::entered(RunPhase::Extracting, 10));
        assert_eq!(
            progress.current.lock().unwrap().as_ref().map(|(p, _)| *p),
            Some(RunPhase::Extracting)
        );

        progress.report(ProgressEvent::new(RunPhase::Done, 10, 10));
        assert!(progress.current.lock().unwrap().is_none());
    }
}
