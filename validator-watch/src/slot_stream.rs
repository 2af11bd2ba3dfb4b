//! The slot clock's infinite sequence (spec §4.1), as a lazy `Stream`.
//!
//! Slots are signed here, unlike `watch_types::Slot`, because the sequence
//! may legitimately start before genesis: the first emitted slot is
//! `floor((now - genesis_time)/SECONDS_PER_SLOT) + 1`, which is negative
//! whenever the clock is consulted before the chain has started. The engine
//! only does real work once a slot is non-negative; until then it just logs
//! a countdown.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::stream::{self, Stream};
use slot_clock::SlotClock;

fn now_since_unix_epoch() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

fn first_slot(clock: &dyn SlotClock) -> i64 {
    let now = now_since_unix_epoch().as_secs() as i64;
    let genesis = clock.genesis_duration().as_secs() as i64;
    let slot_duration = clock.slot_duration().as_secs().max(1) as i64;
    (now - genesis).div_euclid(slot_duration) + 1
}

/// The wall-clock instant `slot` starts at, as a duration since the UNIX
/// epoch. May be zero-clamped for slots so far before genesis that the
/// arithmetic would otherwise underflow — not a case any real chain hits.
fn slot_start_time(clock: &dyn SlotClock, slot: i64) -> Duration {
    let genesis = clock.genesis_duration().as_secs() as i64;
    let slot_duration = clock.slot_duration().as_secs() as i64;
    let start_secs = genesis.saturating_add(slot.saturating_mul(slot_duration));
    Duration::from_secs(start_secs.max(0) as u64)
}

async fn sleep_until_absolute(target: Duration) {
    let now = now_since_unix_epoch();
    if target > now {
        tokio::time::sleep(target - now).await;
    }
}

/// Produces `(slot, slot_start_time)` pairs, sleeping until each slot's
/// start before yielding it. A slot whose start has already passed (the
/// loop fell behind) is emitted immediately rather than skipped.
pub fn slot_stream(clock: Arc<dyn SlotClock>) -> impl Stream<Item = (i64, Duration)> {
    let first = first_slot(clock.as_ref());
    stream::unfold(first, move |slot| {
        let clock = clock.clone();
        async move {
            let start = slot_start_time(clock.as_ref(), slot);
            sleep_until_absolute(start).await;
            Some(((slot, start), slot + 1))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use slot_clock::ManualSlotClock;
    use watch_types::Slot;

    #[test]
    fn first_slot_is_negative_before_genesis() {
        let genesis = now_since_unix_epoch() + Duration::from_secs(3600);
        let clock = ManualSlotClock::new(Slot::new(0), genesis, Duration::from_secs(12));
        assert!(first_slot(&clock) < 0);
    }

    #[test]
    fn slot_start_time_is_linear_in_slot() {
        let clock =
            ManualSlotClock::new(Slot::new(0), Duration::from_secs(1_000_000), Duration::from_secs(12));
        let t0 = slot_start_time(&clock, 0);
        let t5 = slot_start_time(&clock, 5);
        assert_eq!(t5 - t0, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn stream_yields_strictly_increasing_slots() {
        let clock = Arc::new(ManualSlotClock::new(
            Slot::new(0),
            Duration::from_secs(0),
            Duration::from_millis(1),
        )) as Arc<dyn SlotClock>;

        let mut stream = Box::pin(slot_stream(clock));
        let (first, _) = futures::StreamExt::next(&mut stream).await.unwrap();
        let (second, _) = futures::StreamExt::next(&mut stream).await.unwrap();
        assert_eq!(second, first + 1);
    }
}
