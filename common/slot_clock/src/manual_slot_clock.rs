use std::ops::Add;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use watch_types::Slot;

use crate::SlotClock;

/// Determines the present slot based upon a manually-incremented UNIX
/// timestamp. Used by the analytical-module tests to drive the engine
/// through a specific slot sequence without sleeping in real time.
pub struct ManualSlotClock {
    genesis_slot: Slot,
    genesis_duration: Duration,
    current_time: Arc<RwLock<Duration>>,
    slot_duration: Duration,
}

impl Clone for ManualSlotClock {
    fn clone(&self) -> Self {
        ManualSlotClock {
            genesis_slot: self.genesis_slot,
            genesis_duration: self.genesis_duration,
            current_time: Arc::clone(&self.current_time),
            slot_duration: self.slot_duration,
        }
    }
}

impl ManualSlotClock {
    pub fn set_slot(&self, slot: u64) {
        let slots_since_genesis = slot
            .checked_sub(self.genesis_slot.as_u64())
            .expect("slot must be post-genesis");
        *self.current_time.write() =
            self.genesis_duration + self.slot_duration * slots_since_genesis as u32;
    }

    pub fn set_current_time(&self, duration: Duration) {
        *self.current_time.write() = duration;
    }

    pub fn advance_time(&self, duration: Duration) {
        let current_time = *self.current_time.read();
        *self.current_time.write() = current_time.add(duration);
    }

    pub fn advance_slot(&self) {
        self.set_slot(self.now().unwrap().as_u64() + 1)
    }
}

impl SlotClock for ManualSlotClock {
    fn new(genesis_slot: Slot, genesis_duration: Duration, slot_duration: Duration) -> Self {
        if slot_duration.as_millis() == 0 {
            panic!("ManualSlotClock cannot have a < 1ms slot duration");
        }

        Self {
            genesis_slot,
            current_time: Arc::new(RwLock::new(genesis_duration)),
            genesis_duration,
            slot_duration,
        }
    }

    fn now(&self) -> Option<Slot> {
        self.slot_of(*self.current_time.read())
    }

    fn is_prior_to_genesis(&self) -> Option<bool> {
        Some(*self.current_time.read() < self.genesis_duration)
    }

    fn now_duration(&self) -> Option<Duration> {
        Some(*self.current_time.read())
    }

    fn slot_of(&self, now: Duration) -> Option<Slot> {
        let genesis = self.genesis_duration;
        if now >= genesis {
            let since_genesis = now
                .checked_sub(genesis)
                .expect("now is greater than or equal to genesis");
            let slot =
                Slot::from((since_genesis.as_millis() / self.slot_duration.as_millis()) as u64);
            Some(slot + self.genesis_slot.as_u64())
        } else {
            None
        }
    }

    fn duration_to_next_slot(&self) -> Option<Duration> {
        let now = *self.current_time.read();
        if now < self.genesis_duration {
            self.genesis_duration.checked_sub(now)
        } else {
            self.duration_to_slot(self.slot_of(now)? + 1)
        }
    }

    fn slot_duration(&self) -> Duration {
        self.slot_duration
    }

    fn duration_to_slot(&self, slot: Slot) -> Option<Duration> {
        let now = *self.current_time.read();
        self.start_of(slot)?.checked_sub(now)
    }

    fn start_of(&self, slot: Slot) -> Option<Duration> {
        let offset = slot.as_u64().checked_sub(self.genesis_slot.as_u64())?;
        let unadjusted_slot_duration = self.slot_duration.checked_mul(offset.try_into().ok()?)?;
        self.genesis_duration.checked_add(unadjusted_slot_duration)
    }

    fn genesis_slot(&self) -> Slot {
        self.genesis_slot
    }

    fn genesis_duration(&self) -> Duration {
        self.genesis_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_now() {
        let clock = ManualSlotClock::new(Slot::new(10), Duration::from_secs(0), Duration::from_secs(1));
        assert_eq!(clock.now(), Some(Slot::new(10)));
        clock.set_slot(123);
        assert_eq!(clock.now(), Some(Slot::new(123)));
    }

    #[test]
    fn test_is_prior_to_genesis() {
        let genesis_secs = 1;
        let clock = ManualSlotClock::new(
            Slot::new(0),
            Duration::from_secs(genesis_secs),
            Duration::from_secs(1),
        );

        clock.set_current_time(Duration::from_secs(genesis_secs - 1));
        assert!(clock.is_prior_to_genesis().unwrap());

        clock.set_current_time(Duration::from_secs(genesis_secs));
        assert!(!clock.is_prior_to_genesis().unwrap());
    }

    #[test]
    fn start_of() {
        let clock = ManualSlotClock::new(Slot::new(0), Duration::from_secs(0), Duration::from_secs(1));
        assert_eq!(clock.start_of(Slot::new(0)), Some(Duration::from_secs(0)));
        assert_eq!(clock.start_of(Slot::new(2)), Some(Duration::from_secs(2)));

        let clock = ManualSlotClock::new(Slot::new(1), Duration::from_secs(0), Duration::from_secs(1));
        assert_eq!(clock.start_of(Slot::new(0)), None);
        assert_eq!(clock.start_of(Slot::new(1)), Some(Duration::from_secs(0)));
    }

    #[test]
    fn test_duration_to_next_slot() {
        let slot_duration = Duration::from_secs(1);
        let clock = ManualSlotClock::new(Slot::new(0), Duration::from_secs(10), slot_duration);
        clock.set_current_time(Duration::from_secs(0));
        assert_eq!(clock.duration_to_next_slot(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn advance_slot_increments_by_exactly_one() {
        let clock = ManualSlotClock::new(Slot::new(0), Duration::from_secs(0), Duration::from_secs(12));
        clock.advance_slot();
        assert_eq!(clock.now(), Some(Slot::new(1)));
    }
}
