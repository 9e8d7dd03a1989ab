//! Live progress tray for `tooldesk msgs --watch`

use crate::output::console::ConsoleFormatter;
use crate::output::formatter::OutputFormatter;
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use tooldesk_domain::{MsgId, MsgInfo};

/// Receives successive `get_msgs` snapshots
pub trait TrayView {
    /// Render the snapshot taken at `now` (unix seconds).
    fn show(&self, msgs: &[MsgInfo], now: f64);

    /// Called once when watching stops.
    fn finish(&self);
}

/// One progress bar per active session
pub struct TrayReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<MsgId, ProgressBar>>,
}

impl TrayReporter {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Reporter that draws nowhere.
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn session_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.bold.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }

    fn prefix(msg: &MsgInfo) -> String {
        format!("#{} {}", msg.id, ConsoleFormatter::display_name(msg))
    }

    /// Ids of the sessions currently shown.
    pub fn tracked(&self) -> Vec<MsgId> {
        let bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<MsgId> = bars.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for TrayReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl TrayView for TrayReporter {
    fn show(&self, msgs: &[MsgInfo], now: f64) {
        let mut bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());

        bars.retain(|id, bar| {
            let alive = msgs.iter().any(|m| m.id == *id);
            if !alive {
                bar.finish_with_message(format!("{}", "done".green()));
            }
            alive
        });

        for msg in msgs {
            let bar = bars.entry(msg.id).or_insert_with(|| {
                let pb = self.multi.add(ProgressBar::new(100));
                pb.set_style(Self::session_style());
                pb
            });
            bar.set_prefix(Self::prefix(msg));
            bar.set_position(u64::from(msg.percent()));
            let elapsed = ConsoleFormatter::elapsed(msg.elapsed(now));
            let status = if msg.cancelled {
                format!("{} {}", "stopping".red(), elapsed)
            } else if msg.progress_label.is_empty() {
                elapsed
            } else {
                format!("{} {}", msg.progress_label, elapsed.dimmed())
            };
            bar.set_message(status);
        }
    }

    fn finish(&self) {
        let mut bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        for (_, bar) in bars.drain() {
            bar.finish_and_clear();
        }
    }
}

/// Line-oriented tray: prints the whole snapshot whenever it changes
pub struct SimpleTray {
    formatter: Box<dyn OutputFormatter + Send + Sync>,
    last: Mutex<Vec<(MsgId, u8, bool)>>,
}

impl SimpleTray {
    pub fn new() -> Self {
        Self::with_formatter(Box::new(ConsoleFormatter))
    }

    pub fn with_formatter(formatter: Box<dyn OutputFormatter + Send + Sync>) -> Self {
        Self {
            formatter,
            last: Mutex::new(Vec::new()),
        }
    }

    /// True when `msgs` differs from the last printed snapshot.
    fn changed(&self, msgs: &[MsgInfo]) -> bool {
        let key: Vec<(MsgId, u8, bool)> = msgs
            .iter()
            .map(|m| (m.id, m.percent(), m.cancelled))
            .collect();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if *last == key {
            return false;
        }
        *last = key;
        true
    }
}

impl Default for SimpleTray {
    fn default() -> Self {
        Self::new()
    }
}

impl TrayView for SimpleTray {
    fn show(&self, msgs: &[MsgInfo], now: f64) {
        if self.changed(msgs) {
            println!("{}", self.formatter.format_msgs(msgs, now));
        }
    }

    fn finish(&self) {
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: u64, progress: f64) -> MsgInfo {
        MsgInfo {
            id: MsgId(id),
            tool: "Looper".to_string(),
            name: String::new(),
            start_time: 0.0,
            progress,
            progress_label: String::new(),
            cancelled: false,
            parent: None,
        }
    }

    #[test]
    fn test_tray_tracks_snapshot_membership() {
        let tray = TrayReporter::hidden();
        tray.show(&[msg(1, 0.1), msg(2, 0.5)], 10.0);
        assert_eq!(tray.tracked(), vec![MsgId(1), MsgId(2)]);

        tray.show(&[msg(2, 0.7), msg(3, 0.0)], 11.0);
        assert_eq!(tray.tracked(), vec![MsgId(2), MsgId(3)]);

        tray.finish();
        assert!(tray.tracked().is_empty());
    }

    #[test]
    fn test_tray_bar_position_follows_percent() {
        let tray = TrayReporter::hidden();
        tray.show(&[msg(4, 0.42)], 1.0);
        let bars = tray.bars.lock().unwrap();
        assert_eq!(bars[&MsgId(4)].position(), 42);
        assert_eq!(bars[&MsgId(4)].prefix(), "#4 Looper");
    }

    #[test]
    fn test_simple_tray_reports_only_changes() {
        let tray = SimpleTray::new();
        assert!(tray.changed(&[msg(1, 0.1)]));
        assert!(!tray.changed(&[msg(1, 0.1)]));
        assert!(tray.changed(&[msg(1, 0.2)]));
        assert!(tray.changed(&[]));
    }
}
