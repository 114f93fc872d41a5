//! Rust library for discovering and controlling Bose SoundTouch speakers
//!
//! This library provides an async controller for SoundTouch speakers on the
//! local network. It supports:
//!
//! - Discovery via SSDP, with results saved to a JSON device registry
//! - Manual registration of devices by address
//! - A single active device session with power and volume control
//! - Periodic now-playing status polling
//! - Background cover art download and decoding
//! - Display event subscriptions for front-ends
//!
//! # Quick Start
//!
//! ```no_run
//! use soundtouch_controller::{
//!     Controller, ControllerConfig, ControllerEvent, Intent, SoundTouchError,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = Controller::with_http(ControllerConfig::default())?;
//!     let (handle, mut events) = controller.spawn();
//!
//!     // Startup loads the saved devices (and discovers if there are none)
//!     loop {
//!         let event = match events.recv().await {
//!             Ok(event) => event,
//!             // Missed some events; keep going with the next one
//!             Err(SoundTouchError::Lagged(_)) => continue,
//!             Err(_) => break,
//!         };
//!         match event {
//!             ControllerEvent::Devices(names) => {
//!                 if let Some(name) = names.first() {
//!                     handle.send(Intent::Select(name.clone()))?;
//!                 }
//!             }
//!             ControllerEvent::Connected(record) => {
//!                 println!("Connected to {}", record);
//!                 handle.send(Intent::SetVolume(25))?;
//!             }
//!             ControllerEvent::Status(status) => println!("{}", status),
//!             _ => {}
//!         }
//!     }
//!
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Direct Connection
//!
//! If you know the address of a speaker, you can talk to it directly:
//!
//! ```no_run
//! use soundtouch_controller::{DeviceControl, SoundTouchClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SoundTouchClient::connect("192.168.1.100", 8090, Duration::from_secs(5))?;
//!     let playing = client.now_playing(true).await?;
//!     println!("Source: {}", playing.source);
//!     client.set_volume(30).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Controller**: Single task applying user intents, poll ticks and artwork deliveries
//! - **Session / Poller / Artwork**: Per-connection state owned by the controller
//! - **Registry**: Known devices persisted as JSON
//! - **Discovery / SSDP**: Network scan and result normalization
//! - **Client**: SoundTouch control API over HTTP
//! - **Connection**: Low-level HTTP transport
//! - **Protocol**: XML message structures
//! - **Types**: Domain types and data structures

mod artwork;
mod client;
mod config;
mod connection;
mod controller;
mod discovery;
mod error;
mod poller;
mod protocol;
mod registry;
mod session;
mod ssdp;
mod subscription;
mod types;

// Public exports
pub use artwork::{fetch_image, Artwork, ArtworkAction, ArtworkDelivery, ArtworkFetcher};
pub use client::{Connector, DeviceControl, HttpConnector, SoundTouchClient};
pub use config::{ControllerConfig, DEFAULT_REGISTRY_PATH};
pub use connection::Transport;
pub use controller::{Controller, ControllerHandle, Intent};
pub use discovery::{discover_devices, normalize_entry, Discoverer};
pub use error::{Result, SoundTouchError};
pub use poller::StatusPoller;
pub use protocol::{Endpoint, KeyState};
pub use registry::Registry;
pub use session::{ActiveDevice, PowerCommand, Session};
pub use ssdp::{SearchResponse, SsdpDiscoverer};
pub use subscription::{ControllerEvent, EventReceiver};
pub use types::{
    format_clock, DeviceDescriptor, DeviceRecord, DiscoveredEntry, NowPlaying,
    NowPlayingSnapshot, PowerState, Volume, VolumeLevel, DEFAULT_PORT, MAX_VOLUME,
    UNKNOWN_DEVICE_NAME,
};
