//! SSDP discovery of SoundTouch speakers
//!
//! A control point only sends M-SEARCH and reads the unicast replies, so the
//! socket binds an ephemeral port rather than 1900.

use crate::connection::Transport;
use crate::discovery::Discoverer;
use crate::error::Result;
use crate::protocol::{self, Endpoint};
use crate::types::{DeviceDescriptor, DiscoveredEntry, DEFAULT_PORT};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// SSDP multicast address
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// SSDP port
pub const SSDP_PORT: u16 = 1900;

/// Search target SoundTouch speakers answer to
pub const SEARCH_TARGET: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";

/// UDN prefix Bose uses for SoundTouch speakers
const BOSE_UDN_MARKER: &str = "BO5EBO5E";

/// One HTTP/200 reply to an M-SEARCH
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResponse {
    pub location: String,
    pub usn: String,
    pub server: String,
    pub from: SocketAddr,
}

impl SearchResponse {
    /// Check if the responder looks like a Bose SoundTouch speaker
    pub fn is_soundtouch(&self) -> bool {
        self.usn.to_ascii_uppercase().contains(BOSE_UDN_MARKER)
            || self.server.to_ascii_lowercase().contains("bose")
    }

    /// Host to reach the speaker's web services on
    ///
    /// Taken from the LOCATION URL, falling back to the reply's source address.
    pub fn host(&self) -> String {
        url::Url::parse(&self.location)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| self.from.ip().to_string())
    }

    /// Hardware identifier embedded in the USN (`...-FEED-<MAC>`)
    pub fn mac(&self) -> Option<String> {
        let udn = self.usn.split("::").next()?;
        let tail = udn.rsplit('-').next()?;
        let is_mac = tail.len() == 12 && tail.chars().all(|c| c.is_ascii_hexdigit());
        is_mac.then(|| tail.to_ascii_uppercase())
    }
}

/// Discoverer that searches the local network with SSDP
///
/// Each responding speaker is probed on its web services port for a name and
/// MAC. Speakers that answer the probe are reported as structured entries;
/// the rest as bare addresses. Probes run concurrently and all end by the
/// scan deadline.
#[derive(Debug, Clone)]
pub struct SsdpDiscoverer {
    probe_timeout: Duration,
    probe_port: u16,
    http: reqwest::Client,
}

impl SsdpDiscoverer {
    /// Create a discoverer whose `/info` probes use `probe_timeout`
    pub fn new(probe_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(probe_timeout).build()?;
        Ok(Self {
            probe_timeout,
            probe_port: DEFAULT_PORT,
            http,
        })
    }

    /// Probe speakers on `port` instead of 8090
    pub fn with_probe_port(mut self, port: u16) -> Self {
        self.probe_port = port;
        self
    }

    /// Send one M-SEARCH and collect the replies that arrive within `window`
    pub async fn search(&self, window: Duration) -> Result<Vec<SearchResponse>> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await?;
        let mx = window.as_secs().clamp(1, 5);
        let target = SocketAddrV4::new(SSDP_MULTICAST_ADDR, SSDP_PORT);

        socket.send_to(msearch(SEARCH_TARGET, mx).as_bytes(), target).await?;
        tracing::info!("M-SEARCH sent (ST={}, MX={})", SEARCH_TARGET, mx);

        let deadline = Instant::now() + window;
        let mut buf = [0u8; 8192];
        let mut responses = Vec::new();

        loop {
            let received = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await;
            match received {
                Err(_) => break,
                Ok(Ok((n, from))) => {
                    let data = String::from_utf8_lossy(&buf[..n]);
                    match parse_search_response(&data, from) {
                        Some(response) => {
                            tracing::debug!("SSDP reply from {}: {}", from, response.usn);
                            responses.push(response);
                        }
                        None => tracing::trace!("Ignoring SSDP datagram from {}", from),
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!("SSDP read error: {}", e);
                    break;
                }
            }
        }

        Ok(responses)
    }

    /// Probe every speaker at once; a probe still running at `deadline`
    /// yields a bare address entry
    pub async fn probe_all(
        &self,
        speakers: BTreeMap<String, Option<String>>,
        deadline: Instant,
    ) -> Vec<DiscoveredEntry> {
        let mut probes = JoinSet::new();
        for (host, mac) in speakers {
            let discoverer = self.clone();
            probes.spawn(async move {
                match tokio::time::timeout_at(deadline, discoverer.probe(&host, mac)).await {
                    Ok(entry) => entry,
                    Err(_) => {
                        tracing::warn!("Probe of {} still running at the scan deadline", host);
                        discoverer.address(&host)
                    }
                }
            });
        }

        let mut entries = Vec::with_capacity(probes.len());
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Probe task failed: {}", e),
            }
        }
        entries
    }

    async fn probe(&self, host: &str, usn_mac: Option<String>) -> DiscoveredEntry {
        let transport = Transport::with_client(host, self.probe_port, self.http.clone());
        let info = match transport.get(Endpoint::Info).await {
            Ok(body) => protocol::parse_info(&body),
            Err(e) => Err(e),
        };

        match info {
            Ok(info) => DiscoveredEntry::Device(DeviceDescriptor {
                host: Some(host.to_string()),
                mac: info.mac().or(usn_mac),
                name: info.name,
                port: Some(self.probe_port),
            }),
            Err(e) => {
                tracing::warn!(
                    "Probe of {} failed (timeout {:?}): {}",
                    host,
                    self.probe_timeout,
                    e
                );
                self.address(host)
            }
        }
    }

    fn address(&self, host: &str) -> DiscoveredEntry {
        if self.probe_port == DEFAULT_PORT {
            DiscoveredEntry::Address(host.to_string())
        } else {
            DiscoveredEntry::Address(format!("{}:{}", host, self.probe_port))
        }
    }
}

#[async_trait]
impl Discoverer for SsdpDiscoverer {
    async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredEntry>> {
        let deadline = Instant::now() + timeout;

        // Leave part of the budget for probing the responders
        let window = timeout.saturating_sub(self.probe_timeout).max(timeout / 2);
        let responses = self.search(window).await?;

        let mut speakers = BTreeMap::new();
        for response in responses.into_iter().filter(SearchResponse::is_soundtouch) {
            speakers.entry(response.host()).or_insert_with(|| response.mac());
        }
        tracing::info!("{} SoundTouch speaker(s) answered", speakers.len());

        Ok(self.probe_all(speakers, deadline).await)
    }
}

fn msearch(st: &str, mx: u64) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR, SSDP_PORT, mx, st
    )
}

/// Parse an HTTP/200 M-SEARCH reply; anything else yields `None`
pub fn parse_search_response(data: &str, from: SocketAddr) -> Option<SearchResponse> {
    let mut lines = data.lines();
    let status = lines.next()?.trim().to_ascii_uppercase();
    if !(status.starts_with("HTTP/") && status.contains(" 200")) {
        return None;
    }

    let headers = parse_headers(lines);
    Some(SearchResponse {
        location: headers.get("LOCATION")?.clone(),
        usn: headers.get("USN")?.clone(),
        server: headers.get("SERVER").cloned().unwrap_or_default(),
        from,
    })
}

fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        // Values such as LOCATION contain colons; split on the first only
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_uppercase();
            let value = value.trim();
            if !name.is_empty() && !value.is_empty() {
                headers.insert(name, value.to_string());
            }
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOSE_REPLY: &str = "HTTP/1.1 200 OK\r\n\
        CACHE-CONTROL: max-age=1800\r\n\
        LOCATION: http://10.0.0.5:8091/XD/BO5EBO5E-F00D-F00D-FEED-689E19B8BB8A.xml\r\n\
        SERVER: Linux/2.6 UPnP/1.0 Bose/1.0\r\n\
        ST: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
        USN: uuid:BO5EBO5E-F00D-F00D-FEED-689E19B8BB8A::urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
        \r\n";

    fn from() -> SocketAddr {
        "10.0.0.5:1900".parse().unwrap()
    }

    #[test]
    fn parses_bose_reply() {
        let response = parse_search_response(BOSE_REPLY, from()).unwrap();
        assert!(response.is_soundtouch());
        assert_eq!(response.host(), "10.0.0.5");
        assert_eq!(response.mac().as_deref(), Some("689E19B8BB8A"));
    }

    #[test]
    fn other_renderers_are_not_soundtouch() {
        let reply = "HTTP/1.1 200 OK\r\n\
            LOCATION: http://10.0.0.9:1400/xml/device_description.xml\r\n\
            SERVER: Linux UPnP/1.0 Sonos/70.3\r\n\
            USN: uuid:RINCON_000E58A0B1C2::urn:schemas-upnp-org:device:MediaRenderer:1\r\n\r\n";
        let response = parse_search_response(reply, from()).unwrap();
        assert!(!response.is_soundtouch());
        assert_eq!(response.mac(), None);
    }

    #[test]
    fn notify_and_search_requests_are_ignored() {
        let notify = "NOTIFY * HTTP/1.1\r\nNT: upnp:rootdevice\r\nNTS: ssdp:alive\r\n\r\n";
        assert!(parse_search_response(notify, from()).is_none());
        assert!(parse_search_response(&msearch(SEARCH_TARGET, 3), from()).is_none());
    }

    #[test]
    fn reply_without_location_is_ignored() {
        let reply = "HTTP/1.1 200 OK\r\nUSN: uuid:BO5EBO5E-F00D-F00D-FEED-689E19B8BB8A\r\n\r\n";
        assert!(parse_search_response(reply, from()).is_none());
    }

    #[test]
    fn unparsable_location_falls_back_to_sender() {
        let response = SearchResponse {
            location: "not a url".to_string(),
            usn: String::new(),
            server: String::new(),
            from: from(),
        };
        assert_eq!(response.host(), "10.0.0.5");
    }

    /// Accept connections on a local port and never answer them
    async fn silent_speaker() -> (u16, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        (port, task)
    }

    #[tokio::test]
    async fn silent_speaker_falls_back_to_address_by_deadline() {
        let (port, task) = silent_speaker().await;
        let discoverer = SsdpDiscoverer::new(Duration::from_secs(5))
            .unwrap()
            .with_probe_port(port);

        let speakers = BTreeMap::from([("127.0.0.1".to_string(), None)]);
        let start = Instant::now();
        let entries = discoverer
            .probe_all(speakers, start + Duration::from_millis(300))
            .await;

        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(
            entries,
            vec![DiscoveredEntry::Address(format!("127.0.0.1:{}", port))]
        );

        let record = crate::discovery::normalize_entry(&entries[0]).unwrap();
        assert_eq!(record.host, "127.0.0.1");
        assert_eq!(record.port, port);
        task.abort();
    }

    #[tokio::test]
    async fn stalled_speaker_does_not_hold_back_healthy_one() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/info")
            .with_status(200)
            .with_body(concat!(
                r#"<info deviceID="689E19B8BB8A">"#,
                "<name>Kitchen</name><type>SoundTouch 10</type></info>"
            ))
            .create_async()
            .await;
        let port: u16 = server
            .host_with_port()
            .rsplit(':')
            .next()
            .unwrap()
            .parse()
            .unwrap();

        // 192.0.2.1 is a documentation address; nothing answers there
        let discoverer = SsdpDiscoverer::new(Duration::from_secs(5))
            .unwrap()
            .with_probe_port(port);
        let speakers = BTreeMap::from([
            ("127.0.0.1".to_string(), None),
            ("192.0.2.1".to_string(), None),
        ]);
        let entries = discoverer
            .probe_all(speakers, Instant::now() + Duration::from_millis(500))
            .await;

        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| matches!(
            e,
            DiscoveredEntry::Device(d) if d.name.as_deref() == Some("Kitchen")
        )));
        assert!(entries
            .contains(&DiscoveredEntry::Address(format!("192.0.2.1:{}", port))));
    }
}
