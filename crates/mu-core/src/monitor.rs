//! Closed-window monitor bookkeeping.
//!
//! Counts the popups whose closing must synthesize a resolution and owns the
//! single repeating poll timer. The protocol coordinator drives the timer; this
//! type only decides when it has to start and stop.

use std::time::Duration;

use crate::host::TimerId;

#[derive(Debug)]
pub struct WindowMonitor {
    watched: usize,
    timer: Option<TimerId>,
    interval: Duration,
}

impl WindowMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            watched: 0,
            timer: None,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Count one more watched popup. Returns true if the poll timer must be started.
    pub fn watch(&mut self) -> bool {
        self.watched += 1;
        self.timer.is_none()
    }

    pub fn started(&mut self, timer: TimerId) {
        self.timer = Some(timer);
    }

    /// Count one watched popup as gone. Returns the timer to clear if none remain.
    pub fn release(&mut self) -> Option<TimerId> {
        self.watched = self.watched.saturating_sub(1);
        if self.watched == 0 {
            self.timer.take()
        } else {
            None
        }
    }

    /// Stop polling if nothing is watched. Returns the timer to clear.
    pub fn stop_if_idle(&mut self) -> Option<TimerId> {
        if self.watched == 0 {
            self.timer.take()
        } else {
            None
        }
    }

    pub fn watched(&self) -> usize {
        self.watched
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }
}
