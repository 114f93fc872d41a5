use crate::artwork::Artwork;
use crate::error::{Result, SoundTouchError};
use crate::types::{DeviceRecord, NowPlayingSnapshot, VolumeLevel};
use tokio::sync::broadcast;

/// Display update published by the controller
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// Status line text
    Status(String),

    /// Failure the user must acknowledge (registry read/write problems)
    Alert(String),

    /// Registry contents changed; display names in sorted order
    Devices(Vec<String>),

    /// A session was established
    Connected(DeviceRecord),

    /// The session was released
    Disconnected,

    /// Fresh power/volume/content state
    NowPlaying(NowPlayingSnapshot),

    /// Volume the display should show
    ///
    /// Only the controller produces this; front-ends render it without
    /// turning it back into a volume intent.
    Volume(VolumeLevel),

    /// New cover art, or `None` to clear it
    Artwork(Option<Artwork>),
}

/// Receiver for controller events
pub struct EventReceiver {
    rx: broadcast::Receiver<ControllerEvent>,
}

impl EventReceiver {
    /// Create a new event receiver
    pub(crate) fn new(rx: broadcast::Receiver<ControllerEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event
    ///
    /// Fails with `Lagged` when older events were dropped because this
    /// receiver fell behind; the next call resumes with the oldest event
    /// still buffered. Fails with `ChannelError` once the controller has
    /// shut down.
    pub async fn recv(&mut self) -> Result<ControllerEvent> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => {
                SoundTouchError::ChannelError("controller stopped".to_string())
            }
            broadcast::error::RecvError::Lagged(n) => SoundTouchError::Lagged(n),
        })
    }

    /// Try to receive an event without blocking
    ///
    /// Returns `None` if no event is available.
    pub fn try_recv(&mut self) -> Result<Option<ControllerEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => {
                Err(SoundTouchError::ChannelError("controller stopped".to_string()))
            }
            Err(broadcast::error::TryRecvError::Lagged(n)) => Err(SoundTouchError::Lagged(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lagging_receiver_recovers() {
        let (tx, rx) = broadcast::channel(2);
        let mut events = EventReceiver::new(rx);
        for i in 0..4 {
            tx.send(ControllerEvent::Volume(i)).unwrap();
        }

        assert!(matches!(events.recv().await, Err(SoundTouchError::Lagged(2))));
        assert!(matches!(events.recv().await, Ok(ControllerEvent::Volume(2))));
        assert!(matches!(events.try_recv(), Ok(Some(ControllerEvent::Volume(3)))));
        assert!(matches!(events.try_recv(), Ok(None)));
    }

    #[tokio::test]
    async fn closed_channel_is_an_error() {
        let (tx, rx) = broadcast::channel::<ControllerEvent>(2);
        let mut events = EventReceiver::new(rx);
        drop(tx);
        assert!(matches!(events.recv().await, Err(SoundTouchError::ChannelError(_))));
    }
}
