use std::time::{Duration, Instant};

/// A single-slot one-shot timer. Arming replaces whatever deadline was pending.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    pub fn arm(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm and report true if the deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(d) if d <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rearming_replaces_the_pending_deadline() {
        let now = Instant::now();
        let mut t = Timer::default();
        t.arm(now, Duration::from_secs(10));
        t.arm(now, Duration::from_secs(60));
        assert_eq!(t.deadline(), Some(now + Duration::from_secs(60)));
        assert!(!t.fire_if_due(now + Duration::from_secs(10)));
        assert!(t.fire_if_due(now + Duration::from_secs(60)));
        assert_eq!(t.deadline(), None);
        assert!(!t.fire_if_due(now + Duration::from_secs(120)));
    }

    #[test]
    fn cancel_disarms() {
        let now = Instant::now();
        let mut t = Timer::default();
        t.arm(now, Duration::ZERO);
        t.cancel();
        assert!(!t.fire_if_due(now));
    }
}
