//! Run progress accounting.
//!
//! One line per completed unit on stderr, so stdout stays reserved for
//! the parseable end-of-run summary. When stderr is a TTY the lines carry
//! an elapsed/remaining estimate; piped output stays stable for scripts.

use std::time::Instant;

pub struct ProgressTracker {
    total: usize,
    completed: usize,
    succeeded: usize,
    failed: usize,
    started: Instant,
    decorate: bool,
}

impl ProgressTracker {
    pub fn new(total: usize) -> ProgressTracker {
        ProgressTracker {
            total,
            completed: 0,
            succeeded: 0,
            failed: 0,
            started: Instant::now(),
            decorate: atty::is(atty::Stream::Stderr),
        }
    }

    /// Records one terminal outcome and emits its progress line.
    pub fn record(&mut self, full_name: &str, failure: Option<&str>) {
        self.completed += 1;
        let line = match failure {
            None => {
                self.succeeded += 1;
                format!("[{}/{}] ok   {}", self.completed, self.total, full_name)
            }
            Some(reason) => {
                self.failed += 1;
                format!(
                    "[{}/{}] fail {} ({})",
                    self.completed, self.total, full_name, reason
                )
            }
        };
        if self.decorate {
            eprintln!("{}  {}", line, self.eta());
        } else {
            eprintln!("{}", line);
        }
    }

    fn eta(&self) -> String {
        let elapsed = self.started.elapsed().as_secs();
        if self.completed == 0 || self.completed >= self.total {
            return format!("{}s elapsed", elapsed);
        }
        let per_unit = elapsed as f64 / self.completed as f64;
        let remaining = (per_unit * (self.total - self.completed) as f64) as u64;
        format!("{}s elapsed, ~{}s left", elapsed, remaining)
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
