use crate::client::{Connector, DeviceControl};
use crate::error::{Result, SoundTouchError};
use crate::types::{DeviceRecord, NowPlayingSnapshot, PowerState, VolumeLevel, MAX_VOLUME};

/// Which call a power change went through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerCommand {
    /// `power_on()` / `power_off()`
    Explicit(PowerState),
    /// `power()` toggle, used when the current state is unknown
    Toggle,
}

/// Live connection to the selected speaker
pub struct ActiveDevice {
    record: DeviceRecord,
    client: Box<dyn DeviceControl>,
    power: Option<PowerState>,
    last_sent_volume: Option<VolumeLevel>,
}

impl ActiveDevice {
    /// The record this connection is bound to
    pub fn record(&self) -> &DeviceRecord {
        &self.record
    }

    fn name(&self) -> String {
        self.record.display_name()
    }
}

/// At most one active device connection
///
/// Switching devices drops the previous connection before the next one is
/// attempted, so two sessions never coexist.
#[derive(Default)]
pub enum Session {
    #[default]
    Disconnected,
    Connected(ActiveDevice),
}

impl Session {
    /// Create a disconnected session
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Connect to `record`, replacing any current connection
    ///
    /// The connection is only kept if a now-playing health check succeeds;
    /// the snapshot from that check is returned.
    pub async fn connect(
        &mut self,
        connector: &dyn Connector,
        record: DeviceRecord,
    ) -> Result<NowPlayingSnapshot> {
        self.disconnect();

        let name = record.display_name();
        tracing::info!("Connecting to device {} at {}:{}", name, record.host, record.port);

        let client = connector
            .connect(&record.host, record.port)
            .await
            .map_err(|e| SoundTouchError::unreachable(&name, e))?;

        let mut device = ActiveDevice {
            record,
            client,
            power: None,
            last_sent_volume: None,
        };

        match query(&mut device).await {
            Ok(snapshot) => {
                tracing::info!("Successfully connected to device {}", name);
                *self = Session::Connected(device);
                Ok(snapshot)
            }
            Err(e) => {
                tracing::error!("Failed to establish initial connection to {}: {}", name, e);
                Err(e)
            }
        }
    }

    /// Drop the current connection, if any
    pub fn disconnect(&mut self) {
        if let Session::Connected(device) = std::mem::take(self) {
            tracing::info!("Disconnected from {}", device.name());
        }
    }

    /// Check if a device is connected
    pub fn is_connected(&self) -> bool {
        matches!(self, Session::Connected(_))
    }

    /// The connected device's record
    pub fn record(&self) -> Option<&DeviceRecord> {
        match self {
            Session::Connected(device) => Some(&device.record),
            Session::Disconnected => None,
        }
    }

    /// Power state from the last successful query
    pub fn power_state(&self) -> Option<PowerState> {
        match self {
            Session::Connected(device) => device.power,
            Session::Disconnected => None,
        }
    }

    /// Volume most recently sent to the device
    pub fn last_sent_volume(&self) -> Option<VolumeLevel> {
        match self {
            Session::Connected(device) => device.last_sent_volume,
            Session::Disconnected => None,
        }
    }

    fn active(&mut self) -> Result<&mut ActiveDevice> {
        match self {
            Session::Connected(device) => Ok(device),
            Session::Disconnected => Err(SoundTouchError::NotConnected),
        }
    }

    /// Send a volume level, clamped to 0..=100; returns the level sent
    pub async fn set_volume(&mut self, level: VolumeLevel) -> Result<VolumeLevel> {
        let device = self.active()?;
        let level = level.min(MAX_VOLUME);

        device
            .client
            .set_volume(level)
            .await
            .map_err(|e| SoundTouchError::unreachable(device.name(), e))?;

        tracing::debug!("Volume of {} set to {}", device.name(), level);
        device.last_sent_volume = Some(level);
        Ok(level)
    }

    /// Turn the device on or off
    ///
    /// With a known power state the explicit on/off call is used; otherwise
    /// the toggle call is the only safe option.
    pub async fn set_power(&mut self, on: bool) -> Result<PowerCommand> {
        let device = self.active()?;
        let wanted = if on { PowerState::On } else { PowerState::Off };

        let command = match device.power {
            Some(_) => {
                let result = if on {
                    device.client.power_on().await
                } else {
                    device.client.power_off().await
                };
                result.map_err(|e| SoundTouchError::unreachable(device.name(), e))?;
                device.power = Some(wanted);
                PowerCommand::Explicit(wanted)
            }
            None => {
                device
                    .client
                    .power()
                    .await
                    .map_err(|e| SoundTouchError::unreachable(device.name(), e))?;
                PowerCommand::Toggle
            }
        };

        tracing::info!("Power command {:?} sent to {}", command, device.name());
        Ok(command)
    }

    /// Flip the power state
    pub async fn toggle_power(&mut self) -> Result<PowerCommand> {
        let power = self.active()?.power;
        match power {
            Some(current) => self.set_power(!current.is_on()).await,
            None => {
                let device = self.active()?;
                device
                    .client
                    .power()
                    .await
                    .map_err(|e| SoundTouchError::unreachable(device.name(), e))?;
                device.power = None;
                Ok(PowerCommand::Toggle)
            }
        }
    }

    /// Read power, volume and content in one pass
    pub async fn query_now_playing(&mut self) -> Result<NowPlayingSnapshot> {
        query(self.active()?).await
    }
}

async fn query(device: &mut ActiveDevice) -> Result<NowPlayingSnapshot> {
    let result = async {
        let now_playing = device.client.now_playing(true).await?;
        let volume = device.client.volume(true).await?;
        Ok::<_, SoundTouchError>(NowPlayingSnapshot::from_parts(now_playing, volume))
    }
    .await;

    match result {
        Ok(snapshot) => {
            device.power = Some(snapshot.power);
            Ok(snapshot)
        }
        Err(e) => {
            device.power = None;
            Err(SoundTouchError::unreachable(device.name(), e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NowPlaying, Volume};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        log: Vec<String>,
        fail_queries: bool,
        source: String,
        volume: VolumeLevel,
    }

    struct FakeDevice(Arc<Mutex<Calls>>);

    #[async_trait]
    impl DeviceControl for FakeDevice {
        async fn now_playing(&self, _refresh: bool) -> Result<NowPlaying> {
            let calls = self.0.lock().unwrap();
            if calls.fail_queries {
                return Err(SoundTouchError::Timeout);
            }
            Ok(NowPlaying {
                source: calls.source.clone(),
                ..Default::default()
            })
        }

        async fn volume(&self, _refresh: bool) -> Result<Volume> {
            let calls = self.0.lock().unwrap();
            Ok(Volume {
                actual: calls.volume,
                target: calls.volume,
                muted: false,
            })
        }

        async fn set_volume(&self, level: VolumeLevel) -> Result<()> {
            let mut calls = self.0.lock().unwrap();
            calls.volume = level;
            calls.log.push(format!("set_volume({level})"));
            Ok(())
        }

        async fn power_on(&self) -> Result<()> {
            self.0.lock().unwrap().log.push("power_on".into());
            Ok(())
        }

        async fn power_off(&self) -> Result<()> {
            self.0.lock().unwrap().log.push("power_off".into());
            Ok(())
        }

        async fn power(&self) -> Result<()> {
            self.0.lock().unwrap().log.push("power".into());
            Ok(())
        }
    }

    struct FakeConnector(Arc<Mutex<Calls>>);

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, _host: &str, _port: u16) -> Result<Box<dyn DeviceControl>> {
            Ok(Box::new(FakeDevice(self.0.clone())))
        }
    }

    fn calls(source: &str) -> Arc<Mutex<Calls>> {
        Arc::new(Mutex::new(Calls {
            source: source.to_string(),
            volume: 20,
            ..Default::default()
        }))
    }

    async fn connected(calls: &Arc<Mutex<Calls>>) -> Session {
        let mut session = Session::new();
        session
            .connect(&FakeConnector(calls.clone()), DeviceRecord::new("Kitchen", "10.0.0.5"))
            .await
            .unwrap();
        session
    }

    #[tokio::test]
    async fn failed_health_check_stays_disconnected() {
        let calls = calls("BLUETOOTH");
        calls.lock().unwrap().fail_queries = true;

        let mut session = Session::new();
        let err = session
            .connect(&FakeConnector(calls.clone()), DeviceRecord::new("Kitchen", "10.0.0.5"))
            .await
            .unwrap_err();
        assert!(matches!(err, SoundTouchError::DeviceUnreachable { .. }));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn connect_reports_snapshot_and_power() {
        let calls = calls("STANDBY");
        let session = connected(&calls).await;
        assert_eq!(session.power_state(), Some(PowerState::Off));
        assert_eq!(session.record().unwrap().host, "10.0.0.5");
    }

    #[tokio::test]
    async fn disconnected_session_rejects_control() {
        let mut session = Session::new();
        assert!(matches!(
            session.set_volume(10).await,
            Err(SoundTouchError::NotConnected)
        ));
        assert!(matches!(
            session.query_now_playing().await,
            Err(SoundTouchError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn set_volume_clamps_and_records() {
        let calls = calls("BLUETOOTH");
        let mut session = connected(&calls).await;
        assert_eq!(session.set_volume(150).await.unwrap(), 100);
        assert_eq!(session.last_sent_volume(), Some(100));
        assert_eq!(calls.lock().unwrap().log, vec!["set_volume(100)"]);
    }

    #[tokio::test]
    async fn known_power_state_uses_explicit_call() {
        let calls = calls("BLUETOOTH");
        let mut session = connected(&calls).await;
        let command = session.toggle_power().await.unwrap();
        assert_eq!(command, PowerCommand::Explicit(PowerState::Off));
        assert_eq!(calls.lock().unwrap().log, vec!["power_off"]);
        assert_eq!(session.power_state(), Some(PowerState::Off));
    }

    #[tokio::test]
    async fn unknown_power_state_uses_toggle() {
        let calls = calls("BLUETOOTH");
        let mut session = connected(&calls).await;

        // A failed poll forgets the power state
        calls.lock().unwrap().fail_queries = true;
        assert!(session.query_now_playing().await.is_err());
        assert_eq!(session.power_state(), None);

        let command = session.set_power(true).await.unwrap();
        assert_eq!(command, PowerCommand::Toggle);
        assert_eq!(calls.lock().unwrap().log, vec!["power"]);
    }

    #[tokio::test]
    async fn reconnect_replaces_previous_device() {
        let calls = calls("BLUETOOTH");
        let mut session = connected(&calls).await;
        session
            .connect(&FakeConnector(calls.clone()), DeviceRecord::new("Office", "10.0.0.6"))
            .await
            .unwrap();
        assert_eq!(session.record().unwrap().name, "Office");
        assert_eq!(session.last_sent_volume(), None);

        session.disconnect();
        assert!(!session.is_connected());
        assert!(session.record().is_none());
    }
}
