use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rindex::index::{AdHocTaskHeartbeat, ConstructionStep, ProcessHeartbeat, TaskHeartbeat};
use std::fmt::Display;
use std::time::{Duration, Instant};

pub struct Ui {
    quiet: bool,
}

impl Ui {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn section<'a, I, V>(&self, title: &str, rows: I)
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Display,
    {
        let rows: Vec<(String, String)> = rows
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        if rows.is_empty() {
            return;
        }

        println!("{HEADING_ICON} {title}");
        let key_width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in rows {
            println!("  {key:>key_width$}: {value}");
        }
    }

    pub fn list<I>(&self, title: &str, entries: I)
    where
        I: IntoIterator<Item = String>,
    {
        let entries: Vec<String> = entries.into_iter().collect();
        if entries.is_empty() {
            return;
        }
        println!("{HEADING_ICON} {title}");
        for entry in entries {
            println!("  - {entry}");
        }
    }

    pub fn success(&self, message: &str) {
        if self.quiet {
            println!("{message}");
        } else {
            println!("{SUCCESS_ICON} {message}");
        }
    }

    /// Heartbeat drawing construction progress on stderr.
    pub fn notice(&self, message: &str) {
        println!("{message}");
    }

    pub fn heartbeat(&self) -> BarHeartbeat {
        let bar = if self.quiet {
            ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden())
        } else {
            ProgressBar::new(0)
        };
        let style = ProgressStyle::with_template("{prefix} [{bar:30}] {pos}/{len} {msg} ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        bar.set_prefix(PROGRESS_ICON);
        BarHeartbeat {
            bar,
            start: Instant::now(),
        }
    }
}

/// Forwards construction steps and the shard counter to one progress bar.
pub struct BarHeartbeat {
    bar: ProgressBar,
    start: Instant,
}

impl BarHeartbeat {
    pub fn finish(&self) -> Duration {
        self.bar.finish_and_clear();
        self.start.elapsed()
    }
}

struct BarTask<'a> {
    bar: &'a ProgressBar,
}

impl TaskHeartbeat for BarTask<'_> {
    fn progress(&self, step: ConstructionStep) {
        self.bar.set_message(step.name());
    }
}

impl AdHocTaskHeartbeat for BarTask<'_> {
    fn progress(&self, label: &str, current: u64, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(current);
        self.bar.set_message(label.to_string());
    }
}

impl ProcessHeartbeat for BarHeartbeat {
    fn create_task_heartbeat(&self, _task: &str) -> Box<dyn TaskHeartbeat + '_> {
        Box::new(BarTask { bar: &self.bar })
    }

    fn create_ad_hoc_heartbeat(&self, _task: &str) -> Box<dyn AdHocTaskHeartbeat + '_> {
        Box::new(BarTask { bar: &self.bar })
    }
}

pub fn format_duration(duration: Duration) -> String {
    if duration.as_secs_f64() >= 1.0 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{:.0}ms", duration.as_secs_f64() * 1_000.0)
    }
}

const HEADING_ICON: &str = "▸";
const SUCCESS_ICON: &str = "✔";
const PROGRESS_ICON: &str = "▶";
