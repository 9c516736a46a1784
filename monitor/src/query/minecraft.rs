//! Minecraft Java Edition server list ping.
//!
//! Handshake with next state `1`, a status request answered by a JSON
//! document, then a ping/pong exchange used to measure latency. Every packet
//! is framed as `varint length | varint id | payload`.

use super::{resolve, QueryError, QueryResponse};
use log::debug;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

const HANDSHAKE_ID: i32 = 0x00;
const STATUS_ID: i32 = 0x00;
const PING_ID: i32 = 0x01;
/// "Any version" as far as the status exchange is concerned.
const PROTOCOL_VERSION: i32 = -1;
const STATE_STATUS: i32 = 1;
const MAX_PACKET_LEN: i32 = 1 << 20;

#[derive(Debug, Deserialize)]
struct StatusDocument {
    #[serde(default)]
    version: Option<StatusVersion>,
    #[serde(default)]
    players: Option<StatusPlayers>,
}

#[derive(Debug, Deserialize)]
struct StatusVersion {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct StatusPlayers {
    #[serde(default)]
    max: u32,
    #[serde(default)]
    online: u32,
    #[serde(default)]
    sample: Vec<SamplePlayer>,
}

#[derive(Debug, Deserialize)]
struct SamplePlayer {
    #[serde(default)]
    name: String,
}

pub async fn query(host: &str, port: u16) -> Result<QueryResponse, QueryError> {
    let addr = resolve(host, port).await?;
    let mut stream = TcpStream::connect(addr).await?;

    let started = Instant::now();
    stream.write_all(&handshake_packet(host, port)).await?;
    stream.write_all(&frame(STATUS_ID, &[])).await?;

    let (id, payload) = read_packet(&mut stream).await?;
    if id != STATUS_ID {
        return Err(QueryError::Malformed(format!("unexpected packet id {}", id)));
    }
    let status_rtt = started.elapsed();
    let json = decode_string(&payload)?;
    let mut response = parse_status(&json)?;

    response.ping_ms = match ping(&mut stream).await {
        Ok(rtt) => Some(rtt),
        Err(e) => {
            debug!("Ping to {} failed, using status round trip: {}", addr, e);
            Some(status_rtt.as_secs_f64() * 1000.0)
        }
    };

    Ok(response)
}

async fn ping(stream: &mut TcpStream) -> Result<f64, QueryError> {
    let token = chrono::Utc::now().timestamp_millis();
    let started = Instant::now();
    stream.write_all(&frame(PING_ID, &token.to_be_bytes())).await?;

    let (id, payload) = read_packet(stream).await?;
    if id != PING_ID || payload != token.to_be_bytes() {
        return Err(QueryError::Malformed("pong does not echo ping".to_string()));
    }
    Ok(started.elapsed().as_secs_f64() * 1000.0)
}

/// Handshake announcing `host:port` and requesting the status state.
pub fn handshake_packet(host: &str, port: u16) -> Vec<u8> {
    let mut payload = Vec::with_capacity(host.len() + 10);
    write_varint(&mut payload, PROTOCOL_VERSION);
    write_string(&mut payload, host);
    payload.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut payload, STATE_STATUS);
    frame(HANDSHAKE_ID, &payload)
}

/// Prefixes `id | payload` with its varint length.
pub fn frame(id: i32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(payload.len() + 5);
    write_varint(&mut body, id);
    body.extend_from_slice(payload);

    let mut packet = Vec::with_capacity(body.len() + 5);
    write_varint(&mut packet, body.len() as i32);
    packet.extend_from_slice(&body);
    packet
}

async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(i32, Vec<u8>), QueryError> {
    let len = read_varint(reader).await?;
    if len <= 0 || len > MAX_PACKET_LEN {
        return Err(QueryError::Malformed(format!("packet length {}", len)));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    let (id, consumed) = decode_varint(&body)?;
    Ok((id, body.split_off(consumed)))
}

pub fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            buf.push(value as u8);
            return;
        }
        buf.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
}

fn write_string(buf: &mut Vec<u8>, value: &str) {
    write_varint(buf, value.len() as i32);
    buf.extend_from_slice(value.as_bytes());
}

/// Decodes a varint from the front of `bytes`, returning it with its width.
pub fn decode_varint(bytes: &[u8]) -> Result<(i32, usize), QueryError> {
    let mut value: u32 = 0;
    for (i, byte) in bytes.iter().take(5).enumerate() {
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value as i32, i + 1));
        }
    }
    Err(QueryError::Malformed("bad varint".to_string()))
}

async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32, QueryError> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let byte = reader.read_u8().await?;
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(QueryError::Malformed("varint longer than 5 bytes".to_string()))
}

fn decode_string(payload: &[u8]) -> Result<String, QueryError> {
    let (len, offset) = decode_varint(payload)?;
    let len = usize::try_from(len)
        .map_err(|_| QueryError::Malformed("negative string length".to_string()))?;
    let end = offset + len;
    if end > payload.len() {
        return Err(QueryError::Malformed("string overruns packet".to_string()));
    }
    String::from_utf8(payload[offset..end].to_vec())
        .map_err(|_| QueryError::Malformed("status is not utf-8".to_string()))
}

/// Maps the status JSON onto a [`QueryResponse`] without a ping.
pub fn parse_status(json: &str) -> Result<QueryResponse, QueryError> {
    let document: StatusDocument =
        serde_json::from_str(json).map_err(|e| QueryError::Malformed(e.to_string()))?;

    let (players, max_players, player_names) = match document.players {
        Some(p) => (
            p.online,
            p.max,
            p.sample.into_iter().map(|s| s.name).collect(),
        ),
        None => (0, 0, Vec::new()),
    };

    Ok(QueryResponse {
        players,
        max_players,
        player_names,
        map: None,
        version: document
            .version
            .map(|v| v.name)
            .filter(|name| !name.trim().is_empty()),
        ping_ms: None,
    })
}
