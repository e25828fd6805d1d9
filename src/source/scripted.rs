use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cursor::Cursor;
use crate::data::{Page, StatusPartition};
use crate::errors::AggregateError;
use crate::source::{PageRequest, RecordSource};

/// Record source that replays a fixed script of responses.
///
/// Each call pops the next scripted response; an exhausted script answers
/// with empty pages. Cursors seen by the source are recorded so callers can
/// assert on cursoring behavior. When a partition is set, only requests for
/// that partition consume this script.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Page, AggregateError>>>,
    partitions: Mutex<Vec<(StatusPartition, VecDeque<Result<Page, AggregateError>>)>>,
    cursors: Mutex<Vec<Cursor>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    /// Source replaying `script` in order.
    pub fn new(script: Vec<Result<Page, AggregateError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            partitions: Mutex::new(Vec::new()),
            cursors: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Source replaying successful pages in order.
    pub fn from_pages(pages: Vec<Page>) -> Self {
        Self::new(pages.into_iter().map(Ok).collect())
    }

    /// Add a separate script for requests tagged with `status`.
    pub fn with_partition(
        self,
        status: StatusPartition,
        script: Vec<Result<Page, AggregateError>>,
    ) -> Self {
        self.partitions
            .lock()
            .expect("scripted partitions poisoned")
            .push((status, script.into_iter().collect()));
        self
    }

    /// Number of `fetch_page` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Cursors received, in call order.
    pub fn seen_cursors(&self) -> Vec<Cursor> {
        self.cursors.lock().expect("scripted cursors poisoned").clone()
    }
}

impl RecordSource for ScriptedSource {
    fn fetch_page(&self, request: &PageRequest) -> Result<Page, AggregateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cursors
            .lock()
            .expect("scripted cursors poisoned")
            .push(request.cursor);
        if let Some(status) = request.status {
            let mut partitions = self.partitions.lock().expect("scripted partitions poisoned");
            if let Some((_, script)) = partitions.iter_mut().find(|(tag, _)| *tag == status) {
                return script.pop_front().unwrap_or_else(|| Ok(Page::ok(Vec::new())));
            }
        }
        let mut script = self.script.lock().expect("scripted script poisoned");
        script.pop_front().unwrap_or_else(|| Ok(Page::ok(Vec::new())))
    }
}
