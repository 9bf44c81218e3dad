use std::{io::ErrorKind, path::PathBuf};

use async_trait::async_trait;
use hoard_engine::{
    battery::BatteryState,
    device::DeviceId,
    store::{BatteryStateStore, InMemoryBatteryStates},
};
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};

use crate::prelude::*;

/// Battery state store persisted as JSON lines, one snapshot per line.
///
/// The whole journal is replayed on open, so that versions survive between runs.
pub struct Journal {
    path: PathBuf,
    states: InMemoryBatteryStates,
    file: Mutex<File>,
}

impl Journal {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn open(path: PathBuf) -> Result<Self> {
        let states = InMemoryBatteryStates::new();
        let mut n_snapshots = 0_usize;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                for (index, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let snapshot: BatteryState = serde_json::from_str(line)
                        .with_context(|| format!("malformed snapshot at line {}", index + 1))?;
                    states
                        .append(snapshot)
                        .await
                        .with_context(|| format!("inconsistent snapshot at line {}", index + 1))?;
                    n_snapshots += 1;
                }
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => {
                return Err(error).with_context(|| format!("failed to read `{}`", path.display()));
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to open `{}`", path.display()))?;
        info!(n_snapshots, "replayed the journal");
        Ok(Self { path, states, file: Mutex::new(file) })
    }
}

#[async_trait]
impl BatteryStateStore for Journal {
    async fn latest(&self, device_id: &DeviceId) -> hoard_engine::Result<Option<BatteryState>> {
        self.states.latest(device_id).await
    }

    async fn history(&self, device_id: &DeviceId) -> hoard_engine::Result<Vec<BatteryState>> {
        self.states.history(device_id).await
    }

    async fn append(&self, snapshot: BatteryState) -> hoard_engine::Result<BatteryState> {
        let internal = |error: std::io::Error| {
            hoard_engine::Error::Internal(format!("failed to write `{}`: {error:#}", self.path.display()))
        };
        let mut line = serde_json::to_string(&snapshot)
            .map_err(|error| hoard_engine::Error::Internal(error.to_string()))?;
        line.push('\n');

        // Held until the in-memory append, so the version cannot move in between:
        let mut file = self.file.lock().await;
        let history = self.states.history(&snapshot.device_id).await?;
        let found = history.last().map_or(0, |state| state.version);
        if snapshot.version != found + 1 {
            return Err(hoard_engine::Error::Conflict {
                device_id: snapshot.device_id,
                expected: snapshot.version.saturating_sub(1),
                found,
            });
        }
        file.write_all(line.as_bytes()).await.map_err(internal)?;
        file.flush().await.map_err(internal)?;
        self.states.append(snapshot).await
    }
}
