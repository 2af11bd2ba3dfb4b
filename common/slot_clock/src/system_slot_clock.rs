use std::time::{Duration, SystemTime, UNIX_EPOCH};

use watch_types::Slot;

use crate::SlotClock;

/// Slot clock backed by the real wall clock, anchored at `genesis_duration`
/// (seconds since UNIX epoch).
pub struct SystemSlotClock {
    genesis_slot: Slot,
    genesis_duration: Duration,
    slot_duration: Duration,
}

impl SystemSlotClock {
    fn now_since_unix_epoch() -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }
}

impl SlotClock for SystemSlotClock {
    fn new(genesis_slot: Slot, genesis_duration: Duration, slot_duration: Duration) -> Self {
        if slot_duration.as_millis() == 0 {
            panic!("SystemSlotClock cannot have a < 1ms slot duration");
        }
        Self {
            genesis_slot,
            genesis_duration,
            slot_duration,
        }
    }

    fn now(&self) -> Option<Slot> {
        self.slot_of(Self::now_since_unix_epoch())
    }

    fn is_prior_to_genesis(&self) -> Option<bool> {
        Some(Self::now_since_unix_epoch() < self.genesis_duration)
    }

    fn now_duration(&self) -> Option<Duration> {
        Some(Self::now_since_unix_epoch())
    }

    fn slot_of(&self, now: Duration) -> Option<Slot> {
        let since_genesis = now.checked_sub(self.genesis_duration)?;
        let slot = Slot::from((since_genesis.as_millis() / self.slot_duration.as_millis()) as u64);
        Some(slot + self.genesis_slot.as_u64())
    }

    fn start_of(&self, slot: Slot) -> Option<Duration> {
        let offset = slot.as_u64().checked_sub(self.genesis_slot.as_u64())?;
        let unadjusted = self.slot_duration.checked_mul(offset.try_into().ok()?)?;
        self.genesis_duration.checked_add(unadjusted)
    }

    fn duration_to_slot(&self, slot: Slot) -> Option<Duration> {
        self.start_of(slot)?.checked_sub(Self::now_since_unix_epoch())
    }

    fn duration_to_next_slot(&self) -> Option<Duration> {
        let now = Self::now_since_unix_epoch();
        if now < self.genesis_duration {
            self.genesis_duration.checked_sub(now)
        } else {
            self.duration_to_slot(self.slot_of(now)? + 1)
        }
    }

    fn slot_duration(&self) -> Duration {
        self.slot_duration
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
    fn slot_of_is_monotonic_with_time() {
        let clock = SystemSlotClock::new(Slot::new(0), Duration::from_secs(0), Duration::from_secs(12));
        let t0 = clock.slot_of(Duration::from_secs(0)).unwrap();
        let t1 = clock.slot_of(Duration::from_secs(12)).unwrap();
        assert!(t1 > t0);
    }

    #[test]
    fn prior_to_genesis_yields_none_slot() {
        let clock = SystemSlotClock::new(Slot::new(0), Duration::from_secs(u64::MAX / 2), Duration::from_secs(12));
        assert_eq!(clock.slot_of(Duration::from_secs(0)), None);
    }
}
