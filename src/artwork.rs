use crate::error::{Result, SoundTouchError};
use image::RgbaImage;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Decoded cover art ready for display
#[derive(Debug, Clone)]
pub struct Artwork {
    pub url: String,
    pub image: Arc<RgbaImage>,
}

/// Result of one background fetch, sent back to the controller loop
#[derive(Debug)]
pub struct ArtworkDelivery {
    pub generation: u64,
    pub url: String,
    pub result: Result<Arc<RgbaImage>>,
}

/// What `observe` decided to do about a new artwork URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtworkAction {
    /// Same URL as last time; nothing to do
    Unchanged,
    /// A fetch for this URL was started
    Fetching(String),
    /// The URL went away; the display should drop its artwork
    Cleared,
}

/// Downloads cover art off the controller loop
///
/// A fetch is started only when the URL changes. Each fetch carries a
/// generation number; deliveries from fetches that were superseded by a
/// newer URL (or a reset) are discarded, so stale art never replaces newer
/// art.
pub struct ArtworkFetcher {
    http: reqwest::Client,
    deliveries: mpsc::UnboundedSender<ArtworkDelivery>,
    last_url: Option<String>,
    generation: u64,
}

impl ArtworkFetcher {
    /// Create a fetcher that reports results on `deliveries`
    pub fn new(http: reqwest::Client, deliveries: mpsc::UnboundedSender<ArtworkDelivery>) -> Self {
        Self {
            http,
            deliveries,
            last_url: None,
            generation: 0,
        }
    }

    /// URL of the art currently shown or being fetched
    pub fn current_url(&self) -> Option<&str> {
        self.last_url.as_deref()
    }

    /// Generation of the most recent fetch
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// React to the artwork URL from the latest now-playing snapshot
    pub fn observe(&mut self, url: Option<&str>) -> ArtworkAction {
        match url {
            Some(url) if self.last_url.as_deref() == Some(url) => ArtworkAction::Unchanged,
            Some(url) => {
                self.last_url = Some(url.to_string());
                self.generation += 1;
                self.spawn_fetch(url.to_string());
                ArtworkAction::Fetching(url.to_string())
            }
            None if self.last_url.is_none() => ArtworkAction::Unchanged,
            None => {
                self.reset();
                ArtworkAction::Cleared
            }
        }
    }

    /// Forget the current URL and invalidate in-flight fetches
    pub fn reset(&mut self) {
        self.last_url = None;
        self.generation += 1;
    }

    /// Accept a delivery from a fetch task
    ///
    /// Returns `None` for superseded deliveries, `Some(None)` when the art
    /// should be cleared and `Some(Some(artwork))` on success.
    pub fn accept(&mut self, delivery: ArtworkDelivery) -> Option<Option<Artwork>> {
        if delivery.generation != self.generation {
            tracing::debug!(
                "Discarding stale artwork for {} (generation {} < {})",
                delivery.url,
                delivery.generation,
                self.generation
            );
            return None;
        }

        match delivery.result {
            Ok(image) => Some(Some(Artwork {
                url: delivery.url,
                image,
            })),
            Err(e) => {
                tracing::warn!("Failed to load artwork from {}: {}", delivery.url, e);
                Some(None)
            }
        }
    }

    fn spawn_fetch(&self, url: String) {
        let http = self.http.clone();
        let deliveries = self.deliveries.clone();
        let generation = self.generation;
        tracing::debug!("Fetching artwork {} (generation {})", url, generation);

        tokio::spawn(async move {
            let result = fetch_image(&http, &url).await;
            if deliveries
                .send(ArtworkDelivery {
                    generation,
                    url,
                    result,
                })
                .is_err()
            {
                tracing::debug!("Artwork delivery dropped; controller is gone");
            }
        });
    }
}

/// Download and decode an image
pub async fn fetch_image(http: &reqwest::Client, url: &str) -> Result<Arc<RgbaImage>> {
    let response = http.get(url).send().await?.error_for_status()?;
    let bytes = response.bytes().await?;

    // Decoding is CPU-bound; keep it off the async workers
    let image = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await
        .map_err(|e| SoundTouchError::ChannelError(e.to_string()))??;

    Ok(Arc::new(image.to_rgba8()))
}
