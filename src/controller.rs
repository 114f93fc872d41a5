use crate::artwork::{ArtworkAction, ArtworkDelivery, ArtworkFetcher};
use crate::client::{Connector, HttpConnector};
use crate::config::ControllerConfig;
use crate::discovery::{self, Discoverer};
use crate::error::{Result, SoundTouchError};
use crate::poller::StatusPoller;
use crate::registry::Registry;
use crate::session::Session;
use crate::ssdp::SsdpDiscoverer;
use crate::subscription::{ControllerEvent, EventReceiver};
use crate::types::{DeviceDescriptor, DiscoveredEntry, NowPlayingSnapshot, VolumeLevel};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 256;

/// User intents accepted by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Scan the network and add what is found to the registry
    Discover,
    /// Connect to a registered device by display name
    Select(String),
    /// Register a device by address
    AddDevice {
        host: String,
        port: Option<u16>,
        name: Option<String>,
    },
    /// Remove a device from the registry by display name
    RemoveDevice(String),
    /// Set the volume of the connected device
    SetVolume(VolumeLevel),
    /// Turn the connected device on or off
    SetPower(bool),
    /// Flip the connected device's power
    TogglePower,
    /// Re-read the connected device's state now
    Refresh,
    /// Release the current session
    Disconnect,
    /// Stop the controller loop
    Shutdown,
}

/// Owns the registry, session, poller and artwork fetcher, and applies
/// intents to them one at a time
///
/// All state lives on the single task running [`Controller::run`]; the only
/// other tasks are artwork downloads, which report back through a channel.
///
/// # Example
///
/// ```no_run
/// use soundtouch_controller::{
///     Controller, ControllerConfig, ControllerEvent, Intent, SoundTouchError,
/// };
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let controller = Controller::with_http(ControllerConfig::default())?;
///     let (handle, mut events) = controller.spawn();
///
///     handle.send(Intent::Discover)?;
///     loop {
///         match events.recv().await {
///             Ok(ControllerEvent::Status(status)) => println!("{}", status),
///             Ok(_) | Err(SoundTouchError::Lagged(_)) => {}
///             Err(_) => break,
///         }
///     }
///     Ok(())
/// }
/// ```
pub struct Controller {
    config: ControllerConfig,
    discoverer: Box<dyn Discoverer>,
    connector: Box<dyn Connector>,
    registry: Registry,
    session: Session,
    poller: StatusPoller,
    artwork: ArtworkFetcher,
    artwork_rx: mpsc::UnboundedReceiver<ArtworkDelivery>,
    events: broadcast::Sender<ControllerEvent>,
}

impl Controller {
    /// Create a controller over the given collaborators
    pub fn new(
        config: ControllerConfig,
        discoverer: impl Discoverer + 'static,
        connector: impl Connector + 'static,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let (artwork_tx, artwork_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            registry: Registry::new(config.registry_path.clone()),
            session: Session::new(),
            poller: StatusPoller::new(config.poll_interval),
            artwork: ArtworkFetcher::new(http, artwork_tx),
            artwork_rx,
            events,
            discoverer: Box::new(discoverer),
            connector: Box::new(connector),
            config,
        })
    }

    /// Create a controller using SSDP discovery and the HTTP control client
    pub fn with_http(config: ControllerConfig) -> Result<Self> {
        let discoverer = SsdpDiscoverer::new(config.request_timeout)?;
        let connector = HttpConnector::new(config.request_timeout)?;
        Self::new(config, discoverer, connector)
    }

    /// Subscribe to display events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.events.subscribe())
    }

    /// The device registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The current session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The status poller
    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    /// Run the controller on its own task
    ///
    /// The returned receiver is subscribed before the task starts, so it
    /// sees the startup events.
    pub fn spawn(self) -> (ControllerHandle, EventReceiver) {
        let events = self.events.clone();
        let receiver = self.subscribe();
        let (intents, intents_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(intents_rx));

        (
            ControllerHandle {
                intents,
                events,
                task: Some(task),
            },
            receiver,
        )
    }

    /// Process intents, poll ticks and artwork deliveries until shut down
    pub async fn run(mut self, mut intents: mpsc::UnboundedReceiver<Intent>) {
        self.start().await;

        loop {
            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(Intent::Shutdown) | None => break,
                    Some(intent) => self.handle(intent).await,
                },
                _ = self.poller.tick() => self.poll_tick().await,
                Some(delivery) = self.artwork_rx.recv() => self.deliver_artwork(delivery),
            }
        }

        self.disconnect();
        tracing::info!("Controller stopped");
    }

    /// Load the registry and publish it; discover if it is empty
    pub async fn start(&mut self) {
        if let Err(e) = self.registry.load() {
            tracing::error!("Failed to load device registry: {}", e);
            self.emit(ControllerEvent::Alert(format!("Error loading saved devices: {}", e)));
        }

        self.publish_devices();
        self.emit(ControllerEvent::Status(format!(
            "{} saved device(s)",
            self.registry.len()
        )));

        if self.registry.is_empty() {
            self.discover().await;
        }
    }

    /// Apply one intent
    ///
    /// Failures are logged and published as status messages; none escape.
    pub async fn handle(&mut self, intent: Intent) {
        tracing::debug!("Handling intent {:?}", intent);
        match intent {
            Intent::Discover => self.discover().await,
            Intent::Select(name) => self.select(&name).await,
            Intent::AddDevice { host, port, name } => self.add_device(host, port, name),
            Intent::RemoveDevice(name) => self.remove_device(&name),
            Intent::SetVolume(level) => self.set_volume(level).await,
            Intent::SetPower(on) => self.set_power(Some(on)).await,
            Intent::TogglePower => self.set_power(None).await,
            Intent::Refresh => self.refresh().await,
            Intent::Disconnect => self.disconnect(),
            Intent::Shutdown => {}
        }
    }

    /// Handle a poll tick: refresh the display and schedule the next tick
    pub async fn poll_tick(&mut self) {
        if !self.session.is_connected() {
            return;
        }
        self.refresh().await;

        // Errors do not stop polling; transient blips recover on their own
        if self.session.is_connected() {
            self.poller.arm();
        }
    }

    /// Apply a finished artwork download
    pub fn deliver_artwork(&mut self, delivery: ArtworkDelivery) {
        if let Some(artwork) = self.artwork.accept(delivery) {
            self.emit(ControllerEvent::Artwork(artwork));
        }
    }

    async fn discover(&mut self) {
        self.emit(ControllerEvent::Status("Discovering devices...".to_string()));

        let records = match discovery::discover_devices(
            self.discoverer.as_ref(),
            self.config.discovery_timeout,
        )
        .await
        {
            Ok(records) => records,
            Err(e) => {
                self.report("Error discovering devices", &e);
                return;
            }
        };

        let mut persist_error = None;
        for record in &records {
            if let Err(e) = self.registry.upsert(record.clone()) {
                persist_error = Some(e);
            }
        }
        if let Some(e) = persist_error {
            self.alert(&e);
        }
        self.publish_devices();

        match records.first() {
            None => self.emit(ControllerEvent::Status(
                "No devices found. Check your network connection.".to_string(),
            )),
            Some(first) => {
                self.emit(ControllerEvent::Status(format!(
                    "Found {} device(s)",
                    records.len()
                )));
                if !self.session.is_connected() {
                    let name = first.display_name();
                    self.select(&name).await;
                }
            }
        }
    }

    async fn select(&mut self, name: &str) {
        let Some(record) = self.registry.get(name).cloned() else {
            let err = SoundTouchError::UnknownDevice(name.to_string());
            self.report("Error selecting device", &err);
            return;
        };

        // Release everything tied to the old session before connecting
        self.disconnect();
        self.emit(ControllerEvent::Status(format!("Connecting to {}...", name)));

        match self.session.connect(self.connector.as_ref(), record.clone()).await {
            Ok(snapshot) => {
                self.emit(ControllerEvent::Connected(record));
                self.show(snapshot);
                self.poller.arm();
            }
            Err(e) => self.report("Error connecting", &e),
        }
    }

    fn disconnect(&mut self) {
        self.poller.disarm();
        if self.session.is_connected() {
            self.session.disconnect();
            self.artwork.reset();
            self.emit(ControllerEvent::Disconnected);
            self.emit(ControllerEvent::Artwork(None));
        }
    }

    fn add_device(&mut self, host: String, port: Option<u16>, name: Option<String>) {
        let entry = DiscoveredEntry::Device(DeviceDescriptor {
            host: Some(host),
            name,
            port,
            mac: None,
        });
        let record = match discovery::normalize_entry(&entry) {
            Ok(record) => record,
            Err(e) => {
                self.report("Error adding device", &e);
                return;
            }
        };

        let display_name = record.display_name();
        if let Err(e) = self.registry.upsert(record) {
            self.alert(&e);
        }
        self.publish_devices();
        self.emit(ControllerEvent::Status(format!("Added {}", display_name)));
    }

    fn remove_device(&mut self, name: &str) {
        if self.session.record().map(|r| r.display_name()).as_deref() == Some(name) {
            self.disconnect();
        }

        match self.registry.remove(name) {
            Ok(true) => self.emit(ControllerEvent::Status(format!("Removed {}", name))),
            Ok(false) => tracing::debug!("{} was not registered", name),
            Err(e) => self.alert(&e),
        }
        self.publish_devices();
    }

    async fn set_volume(&mut self, level: VolumeLevel) {
        match self.session.set_volume(level).await {
            Ok(sent) => self.emit(ControllerEvent::Volume(sent)),
            Err(e) => self.report("Error setting volume", &e),
        }
    }

    async fn set_power(&mut self, on: Option<bool>) {
        let result = match on {
            Some(on) => self.session.set_power(on).await,
            None => self.session.toggle_power().await,
        };
        match result {
            Ok(command) => {
                tracing::debug!("Power change via {:?}", command);
                self.refresh().await;
            }
            Err(e) => self.report("Error toggling power", &e),
        }
    }

    async fn refresh(&mut self) {
        match self.session.query_now_playing().await {
            Ok(snapshot) => self.show(snapshot),
            Err(e) => self.report("Error updating device status", &e),
        }
    }

    fn show(&mut self, snapshot: NowPlayingSnapshot) {
        let name = self
            .session
            .record()
            .map(|r| r.name.clone())
            .unwrap_or_default();

        if self.artwork.observe(snapshot.artwork_url.as_deref()) == ArtworkAction::Cleared {
            self.emit(ControllerEvent::Artwork(None));
        }
        self.emit(ControllerEvent::Volume(snapshot.volume));
        self.emit(ControllerEvent::Status(snapshot.summary(&name)));
        self.emit(ControllerEvent::NowPlaying(snapshot));
    }

    fn publish_devices(&self) {
        self.emit(ControllerEvent::Devices(self.registry.names()));
    }

    fn report(&self, context: &str, err: &SoundTouchError) {
        tracing::error!("{}: {}", context, err);
        self.emit(ControllerEvent::Status(format!("{}: {}", context, err)));
    }

    fn alert(&self, err: &SoundTouchError) {
        tracing::error!("Device registry error: {}", err);
        self.emit(ControllerEvent::Alert(format!("Error saving devices: {}", err)));
    }

    fn emit(&self, event: ControllerEvent) {
        // No subscribers is fine; the front-end may not be attached yet
        let _ = self.events.send(event);
    }
}

/// Handle to a spawned controller
pub struct ControllerHandle {
    intents: mpsc::UnboundedSender<Intent>,
    events: broadcast::Sender<ControllerEvent>,
    task: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    /// Queue an intent
    pub fn send(&self, intent: Intent) -> Result<()> {
        self.intents
            .send(intent)
            .map_err(|_| SoundTouchError::ChannelError("controller stopped".to_string()))
    }

    /// Subscribe to display events from now on
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.events.subscribe())
    }

    /// Stop the controller and wait briefly for it to finish
    pub async fn shutdown(mut self) {
        let _ = self.intents.send(Intent::Shutdown);
        if let Some(task) = self.task.take() {
            // Give it a moment to stop gracefully
            let _ = tokio::time::timeout(Duration::from_millis(500), task).await;
        }
    }
}
