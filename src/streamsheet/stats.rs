//! Per-StreamSheet step counters

use serde::{Deserialize, Serialize};

/// Step statistics of one StreamSheet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSheetStats {
    /// Externally admitted steps; reset on machine stop
    pub steps: u64,
    /// Endless repeats within the current admission
    pub repeatsteps: u64,
    /// Iterations within the current `execute()` repetition
    pub executesteps: u64,
    /// Finished steps, never reset
    pub finishedsteps: u64,
}

impl StreamSheetStats {
    pub(crate) fn admitted(&mut self) {
        self.steps += 1;
        self.repeatsteps = 0;
    }

    pub(crate) fn repeated(&mut self) {
        self.repeatsteps += 1;
    }

    pub(crate) fn begin_execution(&mut self) {
        self.executesteps = 0;
    }

    pub(crate) fn execute_repetition(&mut self) {
        self.admitted();
        self.executesteps = 1;
    }

    pub(crate) fn execute_substep(&mut self, endless: bool) {
        self.executesteps += 1;
        if endless {
            self.repeatsteps += 1;
        }
    }

    pub(crate) fn finished(&mut self) {
        self.finishedsteps += 1;
    }

    /// Machine stop resets the admission counters only
    pub(crate) fn reset(&mut self) {
        self.steps = 0;
        self.repeatsteps = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_resets_repeatsteps() {
        let mut stats = StreamSheetStats::default();
        stats.admitted();
        stats.repeated();
        stats.repeated();
        assert_eq!(stats.repeatsteps, 2);
        stats.admitted();
        assert_eq!(stats.steps, 2);
        assert_eq!(stats.repeatsteps, 0);
    }

    #[test]
    fn test_execute_counters() {
        let mut stats = StreamSheetStats::default();
        stats.begin_execution();
        stats.execute_repetition();
        stats.execute_substep(true);
        stats.execute_substep(true);
        assert_eq!(stats.executesteps, 3);
        assert_eq!(stats.repeatsteps, 2);
        stats.execute_repetition();
        assert_eq!(stats.executesteps, 1);
        assert_eq!(stats.repeatsteps, 0);
    }

    #[test]
    fn test_reset_keeps_finishedsteps() {
        let mut stats = StreamSheetStats::default();
        stats.admitted();
        stats.finished();
        stats.reset();
        assert_eq!(stats.steps, 0);
        assert_eq!(stats.finishedsteps, 1);
    }
}
