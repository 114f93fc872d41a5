use crate::error::{Result, SoundTouchError};
use crate::types::{DeviceRecord, DiscoveredEntry, DEFAULT_PORT, UNKNOWN_DEVICE_NAME};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// Extra time a collaborator gets past the requested timeout before the
/// scan is abandoned
const DISCOVERY_GRACE: Duration = Duration::from_secs(1);

/// Network discovery collaborator
///
/// Implementations scan for up to `timeout` and report whatever they find,
/// as bare addresses or structured device descriptions.
#[async_trait]
pub trait Discoverer: Send + Sync {
    async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredEntry>>;
}

/// Turn one raw discovery result into a device record
///
/// Bare addresses are split on the first colon into host and port; the
/// port defaults to 8090. Structured entries must carry a host; name and
/// port fall back to defaults individually.
pub fn normalize_entry(entry: &DiscoveredEntry) -> Result<DeviceRecord> {
    match entry {
        DiscoveredEntry::Address(address) => {
            let address = address.trim();
            let (host, port) = match address.split_once(':') {
                Some((host, port)) => {
                    let port = port.trim().parse::<u16>().map_err(|_| {
                        SoundTouchError::MalformedDeviceEntry(format!(
                            "invalid port in address {:?}",
                            address
                        ))
                    })?;
                    (host.trim(), port)
                }
                None => (address, DEFAULT_PORT),
            };
            if host.is_empty() {
                return Err(SoundTouchError::MalformedDeviceEntry(format!(
                    "no host in address {:?}",
                    address
                )));
            }
            Ok(DeviceRecord::new(UNKNOWN_DEVICE_NAME, host).with_port(port))
        }
        DiscoveredEntry::Device(device) => {
            let host = device
                .host
                .as_deref()
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .ok_or_else(|| {
                    SoundTouchError::MalformedDeviceEntry(format!(
                        "device {:?} has no host",
                        device.name.as_deref().unwrap_or(UNKNOWN_DEVICE_NAME)
                    ))
                })?;
            let name = device
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(UNKNOWN_DEVICE_NAME);

            let mut record =
                DeviceRecord::new(name, host).with_port(device.port.unwrap_or(DEFAULT_PORT));
            record.mac = device.mac.clone().filter(|m| !m.trim().is_empty());
            Ok(record)
        }
    }
}

/// Run a discovery scan and normalize the results
///
/// Collaborator failures and scans that overrun the timeout are reported as
/// `DiscoveryFailure`. Entries that fail normalization are logged and
/// skipped; the rest are returned, one per display name. An empty result is
/// not an error.
pub async fn discover_devices(
    discoverer: &dyn Discoverer,
    timeout: Duration,
) -> Result<Vec<DeviceRecord>> {
    tracing::info!("Discovering devices (timeout {:?})", timeout);

    let scan = tokio::time::timeout(timeout + DISCOVERY_GRACE, discoverer.discover(timeout));
    let entries = match scan.await {
        Ok(Ok(entries)) => entries,
        Ok(Err(SoundTouchError::DiscoveryFailure(reason))) => {
            return Err(SoundTouchError::DiscoveryFailure(reason));
        }
        Ok(Err(e)) => return Err(SoundTouchError::DiscoveryFailure(e.to_string())),
        Err(_) => {
            return Err(SoundTouchError::DiscoveryFailure(format!(
                "no answer within {:?}",
                timeout
            )));
        }
    };

    tracing::debug!("Discovery returned {} raw entries", entries.len());

    let mut records = BTreeMap::new();
    for entry in &entries {
        match normalize_entry(entry) {
            Ok(record) => {
                tracing::info!("Found device {}", record);
                records.insert(record.display_name(), record);
            }
            Err(e) => {
                tracing::warn!("Skipping discovery entry {:?}: {}", entry, e);
            }
        }
    }

    tracing::info!("Found {} device(s)", records.len());
    Ok(records.into_values().collect())
}
