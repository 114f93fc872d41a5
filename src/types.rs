use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default SoundTouch web services port
pub const DEFAULT_PORT: u16 = 8090;

/// Name given to devices that did not report one
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown Device";

/// Volume level (0..=100)
pub type VolumeLevel = u8;

/// Highest volume level a device accepts
pub const MAX_VOLUME: VolumeLevel = 100;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_name() -> String {
    UNKNOWN_DEVICE_NAME.to_string()
}

/// A known speaker and how to reach it
///
/// Serialized as `{"host", "name", "port", "mac"}` in the device registry.
/// `port` and `mac` may be absent in older files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub host: String,

    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Hardware identifier (MAC address / device ID)
    #[serde(default)]
    pub mac: Option<String>,
}

impl DeviceRecord {
    /// Create a record on the default port
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            name: name.into(),
            port: DEFAULT_PORT,
            mac: None,
        }
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the hardware identifier
    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }

    /// Key used by the registry and shown to the user.
    ///
    /// `"<name> (<host>)"`, with `:<port>` appended to the host when the
    /// port is not the default one.
    pub fn display_name(&self) -> String {
        if self.port == DEFAULT_PORT {
            format!("{} ({})", self.name, self.host)
        } else {
            format!("{} ({}:{})", self.name, self.host, self.port)
        }
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Structured device description returned by a discovery collaborator
///
/// Every field may be missing; normalization fills in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, alias = "id", alias = "device_id")]
    pub mac: Option<String>,
}

/// One raw discovery result
///
/// Collaborators report either a bare `host[:port]` string or a structured
/// device object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiscoveredEntry {
    Address(String),
    Device(DeviceDescriptor),
}

/// Power state of a speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    /// Check if the speaker is on
    pub fn is_on(self) -> bool {
        matches!(self, PowerState::On)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::On => f.write_str("On"),
            PowerState::Off => f.write_str("Off"),
        }
    }
}

/// Content state reported by a device's now-playing query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NowPlaying {
    /// Active source (`STANDBY` when the speaker is off)
    pub source: String,
    pub item_name: Option<String>,
    pub track: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub position: Option<Duration>,
    pub duration: Option<Duration>,
    pub play_status: Option<String>,
    pub artwork_url: Option<String>,
}

/// Source value reported by a speaker in standby
pub const STANDBY_SOURCE: &str = "STANDBY";

impl NowPlaying {
    /// Derive the power state from the active source
    pub fn power_state(&self) -> PowerState {
        if self.source.eq_ignore_ascii_case(STANDBY_SOURCE) {
            PowerState::Off
        } else {
            PowerState::On
        }
    }
}

/// Volume state reported by a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Volume {
    pub actual: VolumeLevel,
    pub target: VolumeLevel,
    pub muted: bool,
}

/// Point-in-time read of a device's power, volume and content
///
/// Never persisted and never cached past the current display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlayingSnapshot {
    pub power: PowerState,
    pub volume: VolumeLevel,
    pub muted: bool,
    pub source: String,
    pub item_name: Option<String>,
    pub track: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub position: Option<Duration>,
    pub duration: Option<Duration>,
    pub play_status: Option<String>,
    pub artwork_url: Option<String>,
}

impl NowPlayingSnapshot {
    /// Combine a now-playing read and a volume read
    pub fn from_parts(now_playing: NowPlaying, volume: Volume) -> Self {
        Self {
            power: now_playing.power_state(),
            volume: volume.actual.min(MAX_VOLUME),
            muted: volume.muted,
            source: now_playing.source,
            item_name: now_playing.item_name,
            track: now_playing.track,
            artist: now_playing.artist,
            album: now_playing.album,
            position: now_playing.position,
            duration: now_playing.duration,
            play_status: now_playing.play_status,
            artwork_url: now_playing.artwork_url,
        }
    }

    /// Multi-line status text for a device
    pub fn summary(&self, device_name: &str) -> String {
        let mut status = format!(
            "{}\nPower: {}\nSource: {}",
            device_name, self.power, self.source
        );
        if let Some(title) = self.track.as_ref().or(self.item_name.as_ref()) {
            status.push_str(&format!("\nNow Playing: {}", title));
            if let Some(artist) = &self.artist {
                status.push_str(&format!(" - {}", artist));
            }
        }
        if let Some(album) = &self.album {
            status.push_str(&format!("\nAlbum: {}", album));
        }
        if let (Some(position), Some(duration)) = (self.position, self.duration) {
            status.push_str(&format!(
                "\nTime: {} / {}",
                format_clock(position),
                format_clock(duration)
            ));
        }
        status
    }
}

/// Format a duration as `m:ss`
pub fn format_clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}
