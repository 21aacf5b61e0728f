//! Delayed actions, cancelled all at once
//!
//! The timeline does not own a clock or a thread. The control loop asks for
//! [`Timeline::next_deadline`], sleeps until then and hands the current time
//! back to [`Timeline::pop_due`].

use std::time::Instant;

#[derive(Debug)]
struct Scheduled<A> {
    seq: u64,
    due: Instant,
    action: A,
}

#[derive(Debug)]
pub struct Timeline<A> {
    next_seq: u64,
    // Sorted by (due, seq)
    tasks: Vec<Scheduled<A>>,
}

impl<A> Default for Timeline<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Timeline<A> {
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            tasks: Vec::new(),
        }
    }

    /// Run `action` once `due` has passed
    pub fn schedule(&mut self, due: Instant, action: A) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let index = self
            .tasks
            .partition_point(|task| (task.due, task.seq) <= (due, seq));
        self.tasks.insert(index, Scheduled { seq, due, action });
    }

    /// Drop every pending task, returning how many there were
    pub fn cancel_all(&mut self) -> usize {
        let count = self.tasks.len();
        self.tasks.clear();
        count
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.first().map(|task| task.due)
    }

    /// Remove the earliest task whose deadline is at or before `now`
    ///
    /// Returns the deadline with the action so follow-up tasks can be
    /// scheduled relative to when this one was due, not when it was polled.
    pub fn pop_due(&mut self, now: Instant) -> Option<(Instant, A)> {
        if self.tasks.first()?.due <= now {
            let task = self.tasks.remove(0);
            Some((task.due, task.action))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
