use std::collections::VecDeque;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

/// Stdout, teed into `path` when one is given.
pub(crate) fn log_writer(path: Option<&Path>) -> io::Result<BoxMakeWriter> {
    Ok(match path {
        Some(path) => BoxMakeWriter::new(io::stdout.and(Arc::new(File::create(path)?))),
        None => BoxMakeWriter::new(io::stdout),
    })
}

/// Keeps the first steps of a run and a sliding window of the latest ones, so a failure can be
/// reported with its lead-up without logging every step.
pub(crate) struct EventLog {
    first: Vec<String>,
    first_limit: usize,
    tail: VecDeque<String>,
    tail_limit: usize,
    skipped: u64,
}

impl EventLog {
    pub(crate) fn new(first_limit: usize, tail_limit: usize) -> Self {
        Self {
            first: Vec::with_capacity(first_limit),
            first_limit,
            tail: VecDeque::with_capacity(tail_limit),
            tail_limit,
            skipped: 0,
        }
    }

    pub(crate) fn record(&mut self, message: String) {
        if self.first.len() < self.first_limit {
            self.first.push(message);
            return;
        }
        if self.tail_limit == 0 {
            self.skipped += 1;
            return;
        }
        if self.tail.len() == self.tail_limit {
            self.tail.pop_front();
            self.skipped += 1;
        }
        self.tail.push_back(message);
    }

    pub(crate) fn dump_failure(&self, reason: &str) {
        tracing::error!("property violated: {reason}");
        for line in &self.first {
            tracing::error!("  {line}");
        }
        if self.skipped > 0 {
            tracing::error!("  ... {} steps omitted ...", self.skipped);
        }
        for line in &self.tail {
            tracing::error!("  {line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_head_and_tail() {
        let mut log = EventLog::new(2, 2);
        for step in 0..6 {
            log.record(format!("step {step}"));
        }
        assert_eq!(log.first, vec!["step 0", "step 1"]);
        assert_eq!(log.tail, VecDeque::from(vec!["step 4".to_string(), "step 5".to_string()]));
        assert_eq!(log.skipped, 2);
    }
}
