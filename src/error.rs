use std::path::PathBuf;
use thiserror::Error;

/// Result type for SoundTouch operations
pub type Result<T> = std::result::Result<T, SoundTouchError>;

/// Errors that can occur when discovering or controlling SoundTouch speakers
#[derive(Error, Debug)]
pub enum SoundTouchError {
    /// Network discovery failed or timed out
    #[error("Discovery failed: {0}")]
    DiscoveryFailure(String),

    /// A connect or control call to the selected device failed
    #[error("Device {device} unreachable: {source}")]
    DeviceUnreachable {
        /// Display name of the device
        device: String,
        /// Underlying transport or protocol error
        #[source]
        source: Box<SoundTouchError>,
    },

    /// The device registry file could not be read or written
    #[error("Device registry {} unavailable: {reason}", path.display())]
    PersistenceFailure {
        /// Registry file path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// One discovery result could not be turned into a device record
    #[error("Malformed device entry: {0}")]
    MalformedDeviceEntry(String),

    /// A control operation was issued with no device selected
    #[error("No device connected")]
    NotConnected,

    /// The requested display name is not in the registry
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// XML deserialization error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Artwork could not be decoded
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Request timed out waiting for the device
    #[error("Request timeout")]
    Timeout,

    /// Device answered with an `<errors>` document
    #[error("API error: {detail}")]
    ApiError {
        /// Error detail message from the device
        detail: String,
    },

    /// Invalid or unexpected response from the device
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Channel send/receive error
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// An event receiver fell behind and missed events; it can keep receiving
    #[error("Lagged by {0} events")]
    Lagged(u64),
}

impl SoundTouchError {
    /// Wrap a collaborator error as `DeviceUnreachable` for the named device.
    ///
    /// Errors that already carry a device are passed through unchanged.
    pub fn unreachable(device: impl Into<String>, source: SoundTouchError) -> Self {
        match source {
            err @ SoundTouchError::DeviceUnreachable { .. } => err,
            other => SoundTouchError::DeviceUnreachable {
                device: device.into(),
                source: Box::new(other),
            },
        }
    }

    /// Build a `PersistenceFailure` for the given path
    pub(crate) fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        SoundTouchError::PersistenceFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
