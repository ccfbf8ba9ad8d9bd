use std::time::{Duration, Instant};

/// A single owned deadline. Arming replaces whatever the slot held, so at
/// most one action per slot can ever fire.
#[derive(Debug)]
pub(crate) struct TimerSlot<T> {
    armed: Option<(Instant, T)>,
}

impl<T> Default for TimerSlot<T> {
    fn default() -> Self {
        Self { armed: None }
    }
}

impl<T> TimerSlot<T> {
    pub(crate) fn arm(&mut self, at: Instant, action: T) {
        self.armed = Some((at, action));
    }

    pub(crate) fn cancel(&mut self) {
        self.armed = None;
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.armed.as_ref().map(|(at, _)| *at)
    }

    /// Take the action when its deadline has passed.
    pub(crate) fn take_due(&mut self, now: Instant) -> Option<T> {
        match &self.armed {
            Some((at, _)) if *at <= now => self.armed.take().map(|(_, action)| action),
            _ => None,
        }
    }

    /// Disarm and report the time that was left, for re-arming later.
    pub(crate) fn freeze(&mut self, now: Instant) -> Option<(Duration, T)> {
        self.armed
            .take()
            .map(|(at, action)| (at.saturating_duration_since(now), action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arming_replaces_previous_action() {
        let now = Instant::now();
        let mut slot = TimerSlot::default();
        slot.arm(now + Duration::from_secs(1), "first");
        slot.arm(now + Duration::from_secs(5), "second");
        assert_eq!(slot.take_due(now + Duration::from_secs(2)), None);
        assert_eq!(slot.take_due(now + Duration::from_secs(5)), Some("second"));
        assert_eq!(slot.take_due(now + Duration::from_secs(9)), None);
    }

    #[test]
    fn freeze_reports_remaining_time() {
        let now = Instant::now();
        let mut slot = TimerSlot::default();
        slot.arm(now + Duration::from_secs(3), ());
        let (left, ()) = slot.freeze(now + Duration::from_secs(1)).unwrap();
        assert_eq!(left, Duration::from_secs(2));
        assert!(slot.deadline().is_none());
    }
}
