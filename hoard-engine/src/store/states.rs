use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{battery::BatteryState, device::DeviceId, prelude::*};

/// Versioned, append-only record store of battery snapshots keyed by device.
#[async_trait]
pub trait BatteryStateStore: Send + Sync {
    /// Latest snapshot by timestamp.
    async fn latest(&self, device_id: &DeviceId) -> Result<Option<BatteryState>>;

    /// All snapshots of the device in the order they were appended.
    async fn history(&self, device_id: &DeviceId) -> Result<Vec<BatteryState>>;

    /// Append the snapshot.
    ///
    /// The snapshot version must directly follow the latest stored version, otherwise another
    /// writer got there first and the call fails with [`Error::Conflict`].
    async fn append(&self, snapshot: BatteryState) -> Result<BatteryState>;
}

#[derive(Clone, Default)]
pub struct InMemoryBatteryStates {
    snapshots: Arc<RwLock<HashMap<DeviceId, Vec<BatteryState>>>>,
}

impl InMemoryBatteryStates {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatteryStateStore for InMemoryBatteryStates {
    async fn latest(&self, device_id: &DeviceId) -> Result<Option<BatteryState>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .get(device_id)
            .and_then(|history| history.iter().max_by_key(|state| (state.timestamp, state.version)))
            .cloned())
    }

    async fn history(&self, device_id: &DeviceId) -> Result<Vec<BatteryState>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(device_id).cloned().unwrap_or_default())
    }

    async fn append(&self, snapshot: BatteryState) -> Result<BatteryState> {
        let mut snapshots = self.snapshots.write().await;
        let history = snapshots.entry(snapshot.device_id.clone()).or_default();
        let found = history.last().map_or(0, |state| state.version);
        if snapshot.version != found + 1 {
            return Err(Error::Conflict {
                device_id: snapshot.device_id,
                expected: snapshot.version.saturating_sub(1),
                found,
            });
        }
        history.push(snapshot.clone());
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use hoard_quantities::{energy::KilowattHours, percent::Percent};

    use super::*;

    fn snapshot(version: u64, hour: u32) -> BatteryState {
        BatteryState {
            device_id: DeviceId::from("site-1"),
            version,
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap(),
            state_of_charge: Percent::from(50.0),
            state_of_health: None,
            temperature_celsius: None,
            voltage_volts: None,
            current_amperes: None,
            power: None,
            cycle_count: 0,
            remaining_capacity: None,
            throughput: KilowattHours::ZERO,
        }
    }

    #[tokio::test]
    async fn test_latest_snapshot() {
        let store = InMemoryBatteryStates::new();
        store.append(snapshot(1, 10)).await.unwrap();
        store.append(snapshot(2, 11)).await.unwrap();
        let latest = store.latest(&DeviceId::from("site-1")).await.unwrap().unwrap();
        assert_eq!(latest.version, 2);
        assert!(store.latest(&DeviceId::from("site-2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_writer_conflicts() {
        let store = InMemoryBatteryStates::new();
        store.append(snapshot(1, 10)).await.unwrap();
        store.append(snapshot(2, 11)).await.unwrap();
        let result = store.append(snapshot(2, 12)).await;
        assert!(matches!(result, Err(Error::Conflict { expected: 1, found: 2, .. })));
        assert_eq!(store.history(&DeviceId::from("site-1")).await.unwrap().len(), 2);
    }
}
