//! In-sheet suspension state
//!
//! One active source at a time: `pause()`, `sleep()` or `await()`. Owned by
//! the StreamSheet; cancelling means dropping it, so a cancelled suspension
//! cannot fire later.

use crate::requests::{AwaitMode, RequestRegistry};
use crate::sheet::Halt;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Suspension {
    #[default]
    None,
    /// Until resumed from outside
    Paused,
    /// Until the clock reaches `until`
    Sleeping { until: u64 },
    /// Until the awaited requests satisfy `mode`
    Awaiting { ids: Vec<String>, mode: AwaitMode },
}

impl Suspension {
    /// Suspension caused by a halt; `execute()` halts are not suspensions
    pub fn from_halt(halt: &Halt) -> Self {
        match halt {
            Halt::Pause { .. } => Suspension::Paused,
            Halt::Sleep { until, .. } => Suspension::Sleeping { until: *until },
            Halt::Await { ids, mode, .. } => Suspension::Awaiting {
                ids: ids.clone(),
                mode: *mode,
            },
            Halt::Execute { .. } => Suspension::None,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Suspension::None)
    }

    /// Whether an automatic wake condition holds. `Paused` never wakes itself.
    pub fn is_ready(&self, now: u64, requests: &RequestRegistry) -> bool {
        match self {
            Suspension::Sleeping { until } => now >= *until,
            Suspension::Awaiting { ids, mode } => requests.is_satisfied(ids, *mode),
            Suspension::None | Suspension::Paused => false,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Suspension::None => "none",
            Suspension::Paused => "pause",
            Suspension::Sleeping { .. } => "sleep",
            Suspension::Awaiting { .. } => "await",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_wakes_on_time() {
        let reqs = RequestRegistry::new();
        let s = Suspension::Sleeping { until: 100 };
        assert!(!s.is_ready(99, &reqs));
        assert!(s.is_ready(100, &reqs));
    }

    #[test]
    fn test_pause_never_wakes_itself() {
        let reqs = RequestRegistry::new();
        assert!(!Suspension::Paused.is_ready(u64::MAX, &reqs));
        assert!(Suspension::Paused.is_active());
        assert!(!Suspension::None.is_active());
    }

    #[test]
    fn test_await_wakes_on_resolution() {
        let mut reqs = RequestRegistry::new();
        let id = reqs.create("x");
        let s = Suspension::Awaiting {
            ids: vec![id.clone()],
            mode: AwaitMode::All,
        };
        assert!(!s.is_ready(0, &reqs));
        reqs.resolve(&id);
        assert!(s.is_ready(0, &reqs));
    }

    #[test]
    fn test_from_halt() {
        assert_eq!(Suspension::from_halt(&Halt::Pause { cell: 0 }), Suspension::Paused);
        assert_eq!(
            Suspension::from_halt(&Halt::Sleep { cell: 0, until: 5 }).reason(),
            "sleep"
        );
    }
}
