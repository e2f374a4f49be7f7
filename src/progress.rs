//! Progress updates shared by batch generation and email distribution.
//!
//! One update is sent per processed item. Percentages are non-decreasing and
//! the last update of a completed loop is always 100.

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    pub percent: u8,
}

impl Progress {
    pub fn new(processed: usize, total: usize) -> Self {
        Self {
            processed,
            total,
            percent: percent(processed, total),
        }
    }
}

pub type ProgressSender = mpsc::UnboundedSender<Progress>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<Progress>;

pub fn channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// `round(processed / total * 100)`, half rounding up, in integer arithmetic.
pub fn percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let processed = processed.min(total);
    ((processed * 200 + total) / (2 * total)) as u8
}

/// Send an update if anyone is listening. A dropped receiver is not an error.
pub(crate) fn report(tx: Option<&ProgressSender>, processed: usize, total: usize) {
    if let Some(tx) = tx {
        let _ = tx.send(Progress::new(processed, total));
    }
}
