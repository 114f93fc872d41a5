use crate::error::{Result, SoundTouchError};
use crate::types::DeviceRecord;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Persisted set of known devices, keyed by display name
///
/// Every mutation is written through to disk immediately; there is no
/// in-memory-only mode. Write failures are reported to the caller but the
/// in-memory change is kept, so the registry stays usable.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    devices: BTreeMap<String, DeviceRecord>,
}

impl Registry {
    /// Create an empty registry bound to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            devices: BTreeMap::new(),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory contents with the file's contents
    ///
    /// A missing, unreadable or malformed file leaves the registry empty and
    /// returns `PersistenceFailure`. Returns the number of devices loaded.
    pub fn load(&mut self) -> Result<usize> {
        self.devices.clear();

        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SoundTouchError::persistence(&self.path, "file not found"));
            }
            Err(e) => return Err(SoundTouchError::persistence(&self.path, e)),
        };

        let devices: BTreeMap<String, DeviceRecord> = serde_json::from_str(&contents)
            .map_err(|e| SoundTouchError::persistence(&self.path, e))?;

        self.devices = devices;
        tracing::info!(
            "Loaded {} device(s) from {}",
            self.devices.len(),
            self.path.display()
        );
        Ok(self.devices.len())
    }

    /// Write the full mapping to disk, replacing the previous file
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.devices)?;

        // Write a sibling file first so a failed write never truncates the list
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)
            .and_then(|_| std::fs::rename(&tmp_path, &self.path))
            .map_err(|e| {
                let _ = std::fs::remove_file(&tmp_path);
                SoundTouchError::persistence(&self.path, e)
            })?;

        tracing::debug!(
            "Saved {} device(s) to {}",
            self.devices.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Insert or replace a record under its display name, then save
    pub fn upsert(&mut self, record: DeviceRecord) -> Result<()> {
        let name = record.display_name();
        if self.devices.insert(name.clone(), record).is_some() {
            tracing::debug!("Replaced registry entry {}", name);
        } else {
            tracing::info!("Added {} to registry", name);
        }
        self.save()
    }

    /// Remove a record by display name, then save
    ///
    /// Removing a name that is not present is a no-op and returns `Ok(false)`.
    pub fn remove(&mut self, display_name: &str) -> Result<bool> {
        if self.devices.remove(display_name).is_none() {
            return Ok(false);
        }
        tracing::info!("Removed {} from registry", display_name);
        self.save()?;
        Ok(true)
    }

    /// Look up a record by display name
    pub fn get(&self, display_name: &str) -> Option<&DeviceRecord> {
        self.devices.get(display_name)
    }

    /// Check if a display name is registered
    pub fn contains(&self, display_name: &str) -> bool {
        self.devices.contains_key(display_name)
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if the registry has no devices
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Display names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    /// All records in display-name order
    pub fn records(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }
}
