//! The inventory collaborator's contract, plus an in-memory stand-in used
//! by tests and by the CLI when no external inventory service is wired
//! in. The collaborator's real implementation (talking to UFS) is
//! explicitly out of scope — only the interface and a faithful-but-inert
//! record shape live here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Classification of a DUT that selects its default plan list (§4.7).
/// `Other` covers setups the built-in catalog does not have a mapping
/// for; any task/setup combination naming it is a load-time error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupType {
    Cros,
    Labstation,
    Android,
    Jetstream,
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServoHost {
    pub name: String,
    pub usb_key_present: bool,
    pub topology: String,
    pub servod_port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChameleonHost {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BluetoothPeer {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WifiRouter {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpmOutlet {
    pub hostname: String,
    pub outlet_id: String,
    pub state: String,
}

/// The semantic shape of a device record: enough of the real UFS
/// `DeviceRecord` to drive plan-to-resource binding and to give execs
/// something to read/mutate, without pretending to model UFS exactly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,
    pub name: String,
    pub board: String,
    pub model: String,
    pub hardware_id: String,
    pub serial_number: String,
    pub setup_type: Option<SetupType>,
    pub power_supply_type: String,
    pub storage_info: String,
    pub battery_info: String,
    pub wifi_info: String,
    pub bluetooth_info: String,
    pub servo_host: Option<ServoHost>,
    pub chameleon_host: Option<ChameleonHost>,
    pub bluetooth_peers: Vec<BluetoothPeer>,
    pub wifi_routers: Vec<WifiRouter>,
    pub rpm_outlet: Option<RpmOutlet>,
    pub provisioned_os_version: String,
    pub provisioned_firmware_version: String,
    pub cr50_phase: String,
    pub cr50_key_env: String,
    pub device_sku: String,
    pub extra_attributes: HashMap<String, Vec<String>>,
    pub state: String,
}

/// The inventory collaborator's contract (§6). The core depends on this
/// trait, never on a concrete client — production code wires in a real
/// UFS-backed implementation; tests and the CLI default wire in
/// [`MemoryInventory`].
#[async_trait]
pub trait InventoryClient: Send + Sync {
    async fn list_resources_for_unit(&self, unit_name: &str) -> anyhow::Result<Vec<String>>;
    async fn get_dut(&self, resource_name: &str) -> anyhow::Result<DeviceRecord>;
    async fn update_dut(&self, record: &DeviceRecord) -> anyhow::Result<()>;
}

/// A process-local inventory backed by a map, never persisted. Exists so
/// the engine can run end to end (and be tested) without a live UFS.
#[derive(Default)]
pub struct MemoryInventory {
    units: RwLock<HashMap<String, Vec<String>>>,
    devices: RwLock<HashMap<String, DeviceRecord>>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, unit_name: impl Into<String>, resource_name: impl Into<String>, record: DeviceRecord) {
        let unit_name = unit_name.into();
        let resource_name = resource_name.into();
        self.units
            .write()
            .await
            .entry(unit_name)
            .or_default()
            .push(resource_name.clone());
        self.devices.write().await.insert(resource_name, record);
    }

    pub async fn snapshot(&self, resource_name: &str) -> Option<DeviceRecord> {
        self.devices.read().await.get(resource_name).cloned()
    }
}

#[async_trait]
impl InventoryClient for MemoryInventory {
    async fn list_resources_for_unit(&self, unit_name: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .units
            .read()
            .await
            .get(unit_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_dut(&self, resource_name: &str) -> anyhow::Result<DeviceRecord> {
        self.devices
            .read()
            .await
            .get(resource_name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such resource `{resource_name}`"))
    }

    async fn update_dut(&self, record: &DeviceRecord) -> anyhow::Result<()> {
        let mut devices = self.devices.write().await;
        let existing = devices
            .get_mut(&record.name)
            .ok_or_else(|| anyhow::anyhow!("no such resource `{}`", record.name))?;
        *existing = record.clone();
        Ok(())
    }
}
