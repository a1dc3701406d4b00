use crate::bus::SystemBus;
use crate::registers::DeviceState;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::SystemTime;

pub const SNAPSHOT_MAGIC: &str = "ptrauth.snapshot";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub magic: String,
    pub version: u32,
    pub created: String,
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceState>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            magic: SNAPSHOT_MAGIC.to_string(),
            version: SNAPSHOT_VERSION,
            created: now_timestamp(),
            devices: BTreeMap::new(),
        }
    }
}

pub fn now_timestamp() -> String {
    match SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => format!("{}Z", duration.as_secs()),
        Err(_) => "0Z".to_string(),
    }
}

/// Copies the register file of every device on the bus that exposes one.
pub fn capture(bus: &SystemBus) -> Snapshot {
    let devices = bus
        .devices()
        .filter_map(|(_, dev)| dev.state().map(|state| (dev.name().to_string(), *state)))
        .collect();
    Snapshot {
        devices,
        ..Snapshot::default()
    }
}

/// Writes saved register files back. Every named device must be on the bus.
pub fn restore(bus: &mut SystemBus, snapshot: &Snapshot) -> Result<()> {
    for (name, saved) in &snapshot.devices {
        let state = bus
            .device_mut(name)
            .and_then(|dev| dev.state_mut())
            .ok_or_else(|| {
                CoreError::InvalidSnapshot(format!("device {name} not present on the bus"))
            })?;
        *state = *saved;
    }
    Ok(())
}

pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, snapshot)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let reader = BufReader::new(File::open(path)?);
    let snapshot: Snapshot = serde_json::from_reader(reader)?;
    if snapshot.magic != SNAPSHOT_MAGIC {
        return Err(CoreError::InvalidSnapshot(format!(
            "unexpected magic {:?}",
            snapshot.magic
        )));
    }
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(CoreError::InvalidSnapshot(format!(
            "unsupported version {}",
            snapshot.version
        )));
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::PtrauthDevice;

    #[test]
    fn capture_then_restore_round_trips_register_file() {
        let mut bus = SystemBus::new();
        bus.map(0x1000_0000, Box::new(PtrauthDevice::new())).expect("map");
        bus.write(0x1000_1018, 8, 0x99).expect("tweak");
        bus.write(0x1000_1010, 8, 0x4000).expect("plaintext");
        let snap = capture(&bus);
        assert_eq!(snap.devices["qarma"].tweak, 0x99);

        let mut fresh = SystemBus::new();
        fresh.map(0x1000_0000, Box::new(PtrauthDevice::new())).expect("map");
        restore(&mut fresh, &snap).expect("restore");
        assert_eq!(fresh.device_state("qarma"), bus.device_state("qarma"));
    }

    #[test]
    fn restore_rejects_missing_device() {
        let mut snap = Snapshot::default();
        snap.devices.insert("ghost".to_string(), DeviceState::default());
        let mut bus = SystemBus::new();
        assert!(matches!(
            restore(&mut bus, &snap),
            Err(CoreError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn load_rejects_foreign_magic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        let snap = Snapshot {
            magic: "pc-e500.snapshot".to_string(),
            ..Snapshot::default()
        };
        save_snapshot(&path, &snap).expect("save");
        assert!(matches!(
            load_snapshot(&path),
            Err(CoreError::InvalidSnapshot(_))
        ));
    }
}
