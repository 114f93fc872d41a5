use crate::connection::Transport;
use crate::error::{Result, SoundTouchError};
use crate::protocol::{self, Endpoint, KeyState};
use crate::types::{NowPlaying, PowerState, Volume, VolumeLevel, MAX_VOLUME};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Control operations a connected speaker exposes
///
/// `refresh = false` may answer from the last value the client read;
/// `refresh = true` always asks the device.
#[async_trait]
pub trait DeviceControl: Send + Sync {
    /// Read the content/source state
    async fn now_playing(&self, refresh: bool) -> Result<NowPlaying>;

    /// Read the volume state
    async fn volume(&self, refresh: bool) -> Result<Volume>;

    /// Set the volume (0..=100)
    async fn set_volume(&self, level: VolumeLevel) -> Result<()>;

    /// Turn the speaker on
    async fn power_on(&self) -> Result<()>;

    /// Put the speaker in standby
    async fn power_off(&self) -> Result<()>;

    /// Toggle power
    async fn power(&self) -> Result<()>;
}

/// Creates control clients bound to `host:port`
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn DeviceControl>>;
}

/// Client for one SoundTouch speaker's local HTTP/XML API
///
/// # Example
///
/// ```no_run
/// use soundtouch_controller::{DeviceControl, SoundTouchClient};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = SoundTouchClient::connect("192.168.1.100", 8090, Duration::from_secs(5))?;
///     client.set_volume(25).await?;
///     let now_playing = client.now_playing(true).await?;
///     println!("Source: {}", now_playing.source);
///     Ok(())
/// }
/// ```
pub struct SoundTouchClient {
    transport: Transport,
    cache: Mutex<ClientCache>,
}

#[derive(Default)]
struct ClientCache {
    now_playing: Option<NowPlaying>,
    volume: Option<Volume>,
}

impl SoundTouchClient {
    /// Build a client for the speaker at `host:port`
    ///
    /// No request is made; the first control call reveals whether the
    /// speaker is reachable.
    pub fn connect(host: impl Into<String>, port: u16, timeout: Duration) -> Result<Self> {
        Ok(Self::new(Transport::new(host, port, timeout)?))
    }

    /// Build a client over an existing transport
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            cache: Mutex::new(ClientCache::default()),
        }
    }

    /// Get the underlying transport
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Press and release a remote key
    pub async fn press_key(&self, key: &str) -> Result<()> {
        self.transport
            .post(Endpoint::Key, protocol::key_body(key, KeyState::Press))
            .await?;
        self.transport
            .post(Endpoint::Key, protocol::key_body(key, KeyState::Release))
            .await?;
        Ok(())
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, ClientCache> {
        // The cache holds plain data; a poisoned lock still has usable contents
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn ensure_power(&self, wanted: PowerState) -> Result<()> {
        let current = self.now_playing(true).await?.power_state();
        if current == wanted {
            tracing::debug!("{} already {}", self.transport.host(), wanted);
            return Ok(());
        }
        self.press_key("POWER").await?;
        self.cache().now_playing = None;
        Ok(())
    }
}

#[async_trait]
impl DeviceControl for SoundTouchClient {
    async fn now_playing(&self, refresh: bool) -> Result<NowPlaying> {
        if !refresh {
            let cached = self.cache().now_playing.clone();
            if let Some(cached) = cached {
                return Ok(cached);
            }
        }
        let body = self.transport.get(Endpoint::NowPlaying).await?;
        let now_playing = protocol::parse_now_playing(&body)?;
        self.cache().now_playing = Some(now_playing.clone());
        Ok(now_playing)
    }

    async fn volume(&self, refresh: bool) -> Result<Volume> {
        if !refresh {
            let cached = self.cache().volume;
            if let Some(cached) = cached {
                return Ok(cached);
            }
        }
        let body = self.transport.get(Endpoint::Volume).await?;
        let volume = protocol::parse_volume(&body)?;
        self.cache().volume = Some(volume);
        Ok(volume)
    }

    async fn set_volume(&self, level: VolumeLevel) -> Result<()> {
        if level > MAX_VOLUME {
            return Err(SoundTouchError::InvalidResponse(format!(
                "volume {} out of range 0..={}",
                level, MAX_VOLUME
            )));
        }
        self.transport
            .post(Endpoint::Volume, protocol::volume_body(level))
            .await?;
        self.cache().volume = None;
        Ok(())
    }

    async fn power_on(&self) -> Result<()> {
        self.ensure_power(PowerState::On).await
    }

    async fn power_off(&self) -> Result<()> {
        self.ensure_power(PowerState::Off).await
    }

    async fn power(&self) -> Result<()> {
        self.press_key("POWER").await?;
        self.cache().now_playing = None;
        Ok(())
    }
}

/// Connector producing [`SoundTouchClient`]s over HTTP
#[derive(Debug, Clone)]
pub struct HttpConnector {
    http: reqwest::Client,
}

impl HttpConnector {
    /// Create a connector whose clients use the given request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn DeviceControl>> {
        tracing::info!("Connecting to {}:{}", host, port);
        let transport = Transport::with_client(host, port, self.http.clone());
        Ok(Box::new(SoundTouchClient::new(transport)))
    }
}
