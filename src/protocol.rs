//! XML bodies exchanged with the SoundTouch web services API

use crate::error::{Result, SoundTouchError};
use crate::types::{NowPlaying, Volume, VolumeLevel};
use serde::Deserialize;
use std::time::Duration;

/// API endpoint paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    NowPlaying,
    Volume,
    Key,
    Info,
}

impl Endpoint {
    /// Request path for the endpoint
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::NowPlaying => "/now_playing",
            Endpoint::Volume => "/volume",
            Endpoint::Key => "/key",
            Endpoint::Info => "/info",
        }
    }
}

/// Remote key press states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Press,
    Release,
}

impl KeyState {
    fn as_str(self) -> &'static str {
        match self {
            KeyState::Press => "press",
            KeyState::Release => "release",
        }
    }
}

/// Sender tag the device expects on key requests
const KEY_SENDER: &str = "Gabbo";

/// Body for `POST /key`
pub fn key_body(key: &str, state: KeyState) -> String {
    format!(
        r#"<key state="{}" sender="{}">{}</key>"#,
        state.as_str(),
        KEY_SENDER,
        key
    )
}

/// Body for `POST /volume`
pub fn volume_body(level: VolumeLevel) -> String {
    format!("<volume>{}</volume>", level)
}

/// `<nowPlaying>` document
#[derive(Debug, Deserialize)]
#[serde(rename = "nowPlaying")]
pub(crate) struct NowPlayingXml {
    #[serde(rename = "@source", default)]
    source: String,
    #[serde(rename = "ContentItem", default)]
    content_item: Option<ContentItemXml>,
    #[serde(default)]
    track: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    album: Option<String>,
    #[serde(default)]
    art: Option<ArtXml>,
    #[serde(default)]
    time: Option<TimeXml>,
    #[serde(rename = "playStatus", default)]
    play_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentItemXml {
    #[serde(rename = "itemName", default)]
    item_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArtXml {
    #[serde(rename = "@artImageStatus", default)]
    status: Option<String>,
    #[serde(rename = "$text", default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeXml {
    #[serde(rename = "@total", default)]
    total: Option<String>,
    #[serde(rename = "$text", default)]
    position: Option<String>,
}

/// `<volume>` document
#[derive(Debug, Deserialize)]
#[serde(rename = "volume")]
pub(crate) struct VolumeXml {
    #[serde(rename = "targetvolume", default)]
    target: Option<VolumeLevel>,
    #[serde(rename = "actualvolume")]
    actual: VolumeLevel,
    #[serde(rename = "muteenabled", default)]
    muted: bool,
}

/// `<info>` document
#[derive(Debug, Deserialize)]
#[serde(rename = "info")]
pub(crate) struct InfoXml {
    #[serde(rename = "@deviceID", default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub device_type: Option<String>,
    #[serde(rename = "networkInfo", default)]
    pub network_info: Vec<NetworkInfoXml>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NetworkInfoXml {
    #[serde(rename = "macAddress", default)]
    pub mac_address: Option<String>,
    #[serde(rename = "ipAddress", default)]
    pub ip_address: Option<String>,
}

impl InfoXml {
    /// First reported MAC address, falling back to the device ID
    pub fn mac(&self) -> Option<String> {
        self.network_info
            .iter()
            .find_map(|n| non_empty(n.mac_address.clone()))
            .or_else(|| non_empty(self.device_id.clone()))
    }
}

/// `<errors>` document returned on failed requests
#[derive(Debug, Deserialize)]
#[serde(rename = "errors")]
struct ErrorsXml {
    #[serde(rename = "error", default)]
    errors: Vec<ErrorXml>,
}

#[derive(Debug, Deserialize)]
struct ErrorXml {
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "$text", default)]
    detail: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_seconds(value: Option<String>) -> Option<Duration> {
    non_empty(value)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Return an `ApiError` if the body is an `<errors>` document
pub(crate) fn check_errors(body: &str) -> Result<()> {
    let trimmed = body.trim_start();
    let trimmed = match trimmed.strip_prefix("<?xml") {
        Some(rest) => rest.split_once("?>").map(|(_, r)| r.trim_start()).unwrap_or(rest),
        None => trimmed,
    };
    if !trimmed.starts_with("<errors") {
        return Ok(());
    }

    let errors: ErrorsXml = quick_xml::de::from_str(body)?;
    let detail = errors
        .errors
        .into_iter()
        .find_map(|e| non_empty(e.detail).or_else(|| non_empty(e.name)))
        .unwrap_or_else(|| "unspecified device error".to_string());
    Err(SoundTouchError::ApiError { detail })
}

/// Parse a `<nowPlaying>` body
pub fn parse_now_playing(body: &str) -> Result<NowPlaying> {
    check_errors(body)?;
    let xml: NowPlayingXml = quick_xml::de::from_str(body)?;

    // Only a present image is worth fetching
    let artwork_url = xml.art.and_then(|art| {
        let present = art
            .status
            .as_deref()
            .map_or(true, |s| s.eq_ignore_ascii_case("IMAGE_PRESENT"));
        if present {
            non_empty(art.url)
        } else {
            None
        }
    });

    let (position, duration) = match xml.time {
        Some(time) => (parse_seconds(time.position), parse_seconds(time.total)),
        None => (None, None),
    };

    Ok(NowPlaying {
        source: xml.source,
        item_name: xml.content_item.and_then(|c| non_empty(c.item_name)),
        track: non_empty(xml.track),
        artist: non_empty(xml.artist),
        album: non_empty(xml.album),
        position,
        duration,
        play_status: non_empty(xml.play_status),
        artwork_url,
    })
}

/// Parse a `<volume>` body
pub fn parse_volume(body: &str) -> Result<Volume> {
    check_errors(body)?;
    let xml: VolumeXml = quick_xml::de::from_str(body)?;
    Ok(Volume {
        actual: xml.actual,
        target: xml.target.unwrap_or(xml.actual),
        muted: xml.muted,
    })
}

/// Parse an `<info>` body
pub(crate) fn parse_info(body: &str) -> Result<InfoXml> {
    check_errors(body)?;
    Ok(quick_xml::de::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW_PLAYING: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<nowPlaying deviceID="689E19B8BB8A" source="SPOTIFY" sourceAccount="user">
  <ContentItem source="SPOTIFY" type="uri" location="spotify:track:x" isPresetable="true">
    <itemName>Daily Mix</itemName>
  </ContentItem>
  <track>Rock &amp; Roll</track>
  <artist>Led Zeppelin</artist>
  <album>IV</album>
  <art artImageStatus="IMAGE_PRESENT">http://i.scdn.co/image/abc</art>
  <time total="220">61</time>
  <playStatus>PLAY_STATE</playStatus>
  <shuffleSetting>SHUFFLE_OFF</shuffleSetting>
</nowPlaying>"#;

    #[test]
    fn parses_now_playing() {
        let np = parse_now_playing(NOW_PLAYING).unwrap();
        assert_eq!(np.source, "SPOTIFY");
        assert_eq!(np.item_name.as_deref(), Some("Daily Mix"));
        assert_eq!(np.track.as_deref(), Some("Rock & Roll"));
        assert_eq!(np.artist.as_deref(), Some("Led Zeppelin"));
        assert_eq!(np.album.as_deref(), Some("IV"));
        assert_eq!(np.artwork_url.as_deref(), Some("http://i.scdn.co/image/abc"));
        assert_eq!(np.position, Some(Duration::from_secs(61)));
        assert_eq!(np.duration, Some(Duration::from_secs(220)));
        assert_eq!(np.play_status.as_deref(), Some("PLAY_STATE"));
    }

    #[test]
    fn parses_standby() {
        let body = r#"<nowPlaying deviceID="689E19B8BB8A" source="STANDBY"><ContentItem source="STANDBY" isPresetable="true" /></nowPlaying>"#;
        let np = parse_now_playing(body).unwrap();
        assert_eq!(np.source, "STANDBY");
        assert_eq!(np.item_name, None);
        assert_eq!(np.artwork_url, None);
    }

    #[test]
    fn ignores_default_artwork() {
        let body = r#"<nowPlaying source="TUNEIN"><art artImageStatus="SHOW_DEFAULT_IMAGE" /></nowPlaying>"#;
        let np = parse_now_playing(body).unwrap();
        assert_eq!(np.artwork_url, None);
    }

    #[test]
    fn parses_volume() {
        let body = r#"<?xml version="1.0" encoding="UTF-8" ?><volume deviceID="689E19B8BB8A"><targetvolume>32</targetvolume><actualvolume>30</actualvolume><muteenabled>false</muteenabled></volume>"#;
        let volume = parse_volume(body).unwrap();
        assert_eq!(volume.actual, 30);
        assert_eq!(volume.target, 32);
        assert!(!volume.muted);
    }

    #[test]
    fn parses_info() {
        let body = r#"<info deviceID="689E19B8BB8A"><name>Kitchen</name><type>SoundTouch 10</type><networkInfo type="SCM"><macAddress>689E19B8BB8A</macAddress><ipAddress>10.0.0.5</ipAddress></networkInfo><networkInfo type="SMSC"><macAddress>689E19B8BB8B</macAddress><ipAddress>10.0.0.5</ipAddress></networkInfo></info>"#;
        let info = parse_info(body).unwrap();
        assert_eq!(info.name.as_deref(), Some("Kitchen"));
        assert_eq!(info.device_type.as_deref(), Some("SoundTouch 10"));
        assert_eq!(info.mac().as_deref(), Some("689E19B8BB8A"));
    }

    #[test]
    fn errors_document_becomes_api_error() {
        let body = r#"<?xml version="1.0" encoding="UTF-8" ?><errors deviceID="689E19B8BB8A"><error value="1019" name="CLIENT_XML_ERROR" severity="Unknown">Invalid volume</error></errors>"#;
        match parse_volume(body) {
            Err(SoundTouchError::ApiError { detail }) => assert_eq!(detail, "Invalid volume"),
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[test]
    fn request_bodies() {
        assert_eq!(volume_body(42), "<volume>42</volume>");
        assert_eq!(
            key_body("POWER", KeyState::Release),
            r#"<key state="release" sender="Gabbo">POWER</key>"#
        );
    }
}
