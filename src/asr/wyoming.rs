//! Wyoming Protocol Client
//!
//! Implements the Wyoming protocol for external ASR services.
//! Each event is a JSON header line, optionally followed by a binary
//! payload whose size is announced in `payload_length`.
//!
//! Reference: https://github.com/rhasspy/wyoming

use super::{extract_text, Recognizer};
use crate::audio::AudioSegment;
use crate::error::{VoxError, VoxResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Audio is sent in chunks of this many bytes
const CHUNK_BYTES: usize = 2048;
/// Upper bound on a single transcription round trip
const TRANSCRIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Header line of a Wyoming event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventHeader {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_length: Option<usize>,
}

impl EventHeader {
    fn new(event_type: &str, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            data: Some(data),
            data_length: None,
            payload_length: None,
        }
    }
}

/// Audio format sent with every audio event
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AudioFormat {
    pub rate: u32,
    pub width: u8,
    pub channels: u8,
}

/// Wyoming client for ASR services
pub struct WyomingClient {
    host: String,
    port: u16,
    language: String,
}

impl WyomingClient {
    /// Create a new Wyoming client
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            language: "en".to_string(),
        }
    }

    /// Check if the server is available
    pub async fn health_check(&self) -> bool {
        match TcpStream::connect((&*self.host, self.port)).await {
            Ok(_) => {
                debug!("Wyoming server available at {}:{}", self.host, self.port);
                true
            }
            Err(e) => {
                warn!("Wyoming server not available: {}", e);
                false
            }
        }
    }

    async fn round_trip(&self, segment: &AudioSegment) -> anyhow::Result<String> {
        let stream = TcpStream::connect((&*self.host, self.port)).await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let format = AudioFormat {
            rate: segment.sample_rate,
            width: 2,
            channels: 1,
        };
        let format_json = serde_json::to_value(format)?;

        write_event(
            &mut writer,
            &EventHeader::new("transcribe", serde_json::json!({ "language": self.language })),
            &[],
        )
        .await?;
        write_event(
            &mut writer,
            &EventHeader::new("audio-start", format_json.clone()),
            &[],
        )
        .await?;

        let pcm = segment.to_le_bytes();
        for chunk in pcm.chunks(CHUNK_BYTES) {
            write_event(
                &mut writer,
                &EventHeader::new("audio-chunk", format_json.clone()),
                chunk,
            )
            .await?;
        }

        write_event(&mut writer, &EventHeader::new("audio-stop", serde_json::json!({})), &[])
            .await?;
        writer.flush().await?;

        debug!(
            "Sent audio ({} bytes), waiting for transcript...",
            pcm.len()
        );

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(String::new());
            }

            let header: EventHeader = match serde_json::from_str(line.trim()) {
                Ok(h) => h,
                Err(e) => {
                    debug!("Ignoring unparseable Wyoming line: {}", e);
                    continue;
                }
            };

            // Extra data and payload bytes follow the header
            let mut data = header.data.clone();
            if let Some(len) = header.data_length.filter(|l| *l > 0) {
                let mut buf = vec![0u8; len];
                reader.read_exact(&mut buf).await?;
                data = serde_json::from_slice(&buf).ok().or(data);
            }
            if let Some(len) = header.payload_length.filter(|l| *l > 0) {
                let mut buf = vec![0u8; len];
                reader.read_exact(&mut buf).await?;
            }

            if header.event_type == "transcript" {
                let text = data
                    .as_ref()
                    .and_then(|d| d.get("text"))
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string();
                return Ok(text);
            }
        }
    }
}

async fn write_event<W>(writer: &mut W, header: &EventHeader, payload: &[u8]) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut header = header.clone();
    if !payload.is_empty() {
        header.payload_length = Some(payload.len());
    }
    let mut line = serde_json::to_vec(&header)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    Ok(())
}

#[async_trait]
impl Recognizer for WyomingClient {
    async fn transcribe(&self, segment: &AudioSegment) -> VoxResult<Option<String>> {
        if segment.is_empty() {
            return Ok(None);
        }

        let transcript = tokio::time::timeout(TRANSCRIPT_TIMEOUT, self.round_trip(segment))
            .await
            .map_err(|_| VoxError::RecognitionService("timeout waiting for transcript".into()))?
            .map_err(|e| {
                VoxError::RecognitionService(format!(
                    "Wyoming {}:{}: {:#}",
                    self.host, self.port, e
                ))
            })?;

        let text = extract_text(&transcript);
        if let Some(ref t) = text {
            info!("📝 Wyoming transcript: '{}'", t);
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "wyoming"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_header_serialization() {
        let header = EventHeader::new("audio-start", serde_json::json!({"rate": 16000}));
        let json = serde_json::to_value(&header).unwrap();
        assert_eq!(json["type"], "audio-start");
        assert_eq!(json["data"]["rate"], 16000);
        assert!(json.get("payload_length").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_service_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = WyomingClient::new("127.0.0.1", port);
        let result = client.transcribe(&AudioSegment::new(vec![1; 160])).await;
        assert!(matches!(result, Err(VoxError::RecognitionService(_))));
    }

    #[tokio::test]
    async fn test_transcript_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = socket.into_split();
            let mut reader = BufReader::new(reader);
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    return;
                }
                let header: EventHeader = serde_json::from_str(line.trim()).unwrap();
                if let Some(len) = header.payload_length {
                    let mut buf = vec![0u8; len];
                    reader.read_exact(&mut buf).await.unwrap();
                }
                if header.event_type == "audio-stop" {
                    let reply = r#"{"type":"transcript","data":{"text":" hello there "}}"#;
                    writer.write_all(reply.as_bytes()).await.unwrap();
                    writer.write_all(b"\n").await.unwrap();
                    return;
                }
            }
        });

        let client = WyomingClient::new("127.0.0.1", port);
        let text = client
            .transcribe(&AudioSegment::new(vec![100; 3000]))
            .await
            .unwrap();
        assert_eq!(text.as_deref(), Some("hello there"));
        server.await.unwrap();
    }
}
