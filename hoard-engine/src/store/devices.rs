use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    device::{Device, DeviceId},
    prelude::*,
};

#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn get(&self, device_id: &DeviceId) -> Result<Option<Device>>;
}

#[derive(Default)]
pub struct InMemoryDevices(HashMap<DeviceId, Device>);

impl InMemoryDevices {
    /// Build the registry, validating each battery specification.
    pub fn try_new(devices: impl IntoIterator<Item = Device>) -> Result<Self> {
        let mut registry = HashMap::new();
        for device in devices {
            device.battery.validate()?;
            if let Some(duplicate) = registry.insert(device.id.clone(), device) {
                return Err(Error::Validation(format!("duplicate device `{}`", duplicate.id)));
            }
        }
        Ok(Self(registry))
    }
}

#[async_trait]
impl DeviceStore for InMemoryDevices {
    async fn get(&self, device_id: &DeviceId) -> Result<Option<Device>> {
        Ok(self.0.get(device_id).cloned())
    }
}
