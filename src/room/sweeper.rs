//! Periodic eviction of rooms that stayed empty past the idle TTL

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use crate::store::Persistence;

use super::RoomRegistry;

/// Run forever, evicting idle rooms every `period` and deleting their
/// persisted records. A zero `ttl` disables eviction.
pub async fn run_idle_sweep(
    rooms: Arc<RoomRegistry>,
    persistence: Persistence,
    ttl: Duration,
    period: Duration,
) {
    if ttl.is_zero() {
        info!("Idle room eviction disabled");
        return;
    }

    let mut ticker = interval(period.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        sweep_once(&rooms, &persistence, ttl);
    }
}

/// One sweep pass; returns how many rooms were evicted
pub fn sweep_once(rooms: &RoomRegistry, persistence: &Persistence, ttl: Duration) -> usize {
    let evicted = rooms.evict_idle(ttl);
    for room_id in &evicted {
        persistence.delete(room_id.clone());
    }
    evicted.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KvStore, MemoryKv, RoomRepository};

    #[tokio::test]
    async fn sweep_deletes_persisted_record() {
        let repository = Arc::new(RoomRepository::new(KvStore::Memory(MemoryKv::new())));
        let (persistence, _writer) = Persistence::spawn(repository.clone());
        let rooms = RoomRegistry::new();
        let room = rooms.create("stale".into(), String::new());
        repository.save(&room.record()).await.unwrap();

        assert_eq!(sweep_once(&rooms, &persistence, Duration::ZERO), 1);
        persistence.flush().await;

        assert!(rooms.is_empty());
        assert!(repository.load(room.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_ttl_disables_the_loop() {
        let rooms = Arc::new(RoomRegistry::new());
        rooms.create("kept".into(), String::new());

        run_idle_sweep(rooms.clone(), Persistence::disabled(), Duration::ZERO, Duration::from_secs(1)).await;
        assert_eq!(rooms.len(), 1);
    }
}
