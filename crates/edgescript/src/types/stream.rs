//! Character streams fed by background jobs.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct StreamState {
    queue: VecDeque<char>,
    closed: bool,
}

/// A push-based character stream.
///
/// A producer (the task's stream-push thread, fed by an LLM or a simulated
/// source) pushes characters and eventually closes the stream; scripts poll
/// with `next_available`/`finished` or block on `get_blocking_str`.
#[derive(Debug, Default)]
pub struct CharStream {
    state: Mutex<StreamState>,
    cv: Condvar,
}

impl CharStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, c: char) {
        let mut state = self.state.lock();
        state.queue.push_back(c);
        self.cv.notify_all();
    }

    pub fn close(&self) {
        self.state.lock().closed = true;
        self.cv.notify_all();
    }

    /// True once the producer closed the stream and every character has been
    /// consumed.
    pub fn finished(&self) -> bool {
        let state = self.state.lock();
        state.closed && state.queue.is_empty()
    }

    /// Pops the next character if one is queued; never blocks.
    pub fn next_available(&self) -> Option<char> {
        self.state.lock().queue.pop_front()
    }

    /// Blocks until the producer closes the stream, then drains everything
    /// still queued. Callers must release the script lock first.
    pub fn get_blocking_str(&self) -> String {
        let mut state = self.state.lock();
        while !state.closed {
            self.cv.wait(&mut state);
        }
        state.queue.drain(..).collect()
    }
}

/// Outcome of one pump of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// More work remains; pump again.
    Retry,
    /// The job is done and can be dropped.
    Complete,
}

/// A background job pumped by the task's stream-push thread.
pub trait StreamJob: Send {
    fn process(&mut self) -> JobStatus;
}

/// Feeds a fixed text into a [`CharStream`] a chunk at a time, mimicking a
/// token-by-token producer.
#[derive(Debug)]
pub struct FillCharStreamJob {
    stream: Arc<CharStream>,
    source: VecDeque<char>,
}

impl FillCharStreamJob {
    const CHUNK: usize = 16;

    pub fn new(stream: Arc<CharStream>, text: &str) -> Self {
        Self {
            stream,
            source: text.chars().collect(),
        }
    }
}

impl StreamJob for FillCharStreamJob {
    fn process(&mut self) -> JobStatus {
        for _ in 0..Self::CHUNK {
            match self.source.pop_front() {
                Some(c) => self.stream.push(c),
                None => {
                    self.stream.close();
                    return JobStatus::Complete;
                }
            }
        }
        if self.source.is_empty() {
            self.stream.close();
            JobStatus::Complete
        } else {
            JobStatus::Retry
        }
    }
}
