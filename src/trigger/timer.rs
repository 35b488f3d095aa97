//! Interval schedule for timer triggers

/// Next-fire bookkeeping for a timer trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSchedule {
    interval_ms: u64,
    start_ms: Option<u64>,
    next_due: Option<u64>,
}

impl TimerSchedule {
    pub fn new(interval_ms: u64, start_ms: Option<u64>) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            start_ms,
            next_due: None,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn next_due(&self) -> Option<u64> {
        self.next_due
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    /// Schedule the first fire. A past start time is aligned to the next
    /// interval boundary after `now`.
    pub fn arm(&mut self, now: u64) {
        let due = match self.start_ms {
            Some(start) if start >= now => start,
            Some(start) => start + (now - start).div_ceil(self.interval_ms) * self.interval_ms,
            None => now + self.interval_ms,
        };
        self.next_due = Some(due);
    }

    pub fn disarm(&mut self) {
        self.next_due = None;
    }

    /// Fire if due. Missed intervals are coalesced into one fire.
    pub fn fire_if_due(&mut self, now: u64) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                let mut next = due + self.interval_ms;
                if next <= now {
                    next += ((now - next) / self.interval_ms + 1) * self.interval_ms;
                }
                self.next_due = Some(next);
                true
            }
            _ => false,
        }
    }
}
