//! Valve A2S queries over UDP (`A2S_INFO` for the server card, `A2S_PLAYER`
//! for the name list). Both requests may be answered with a challenge that
//! has to be echoed back.

use super::{resolve, QueryError, QueryResponse};
use log::debug;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;

const SIMPLE_HEADER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const SPLIT_HEADER: [u8; 4] = [0xFE, 0xFF, 0xFF, 0xFF];

const A2S_INFO: u8 = 0x54;
const A2S_PLAYER: u8 = 0x55;
const S2A_INFO: u8 = 0x49;
const S2A_PLAYER: u8 = 0x44;
const S2C_CHALLENGE: u8 = 0x41;

const INFO_PAYLOAD: &[u8] = b"Source Engine Query\0";
const NO_CHALLENGE: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const THE_SHIP_APP_ID: u16 = 2400;
const MAX_DATAGRAM: usize = 4096;

/// Upper bound for the optional player list request.
const PLAYER_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Server card decoded from `S2A_INFO`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub name: String,
    pub map: String,
    pub game: String,
    pub players: u8,
    pub max_players: u8,
    pub bots: u8,
    pub version: Option<String>,
}

pub async fn query(host: &str, port: u16, deadline: Instant) -> Result<QueryResponse, QueryError> {
    let addr = resolve(host, port).await?;
    let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(addr).await?;

    let started = Instant::now();
    let mut reply = request(&socket, &info_request(None)).await?;
    if reply.first() == Some(&S2C_CHALLENGE) {
        let challenge = challenge_of(&reply)?;
        reply = request(&socket, &info_request(Some(challenge))).await?;
    }
    let ping = started.elapsed();

    if reply.first() != Some(&S2A_INFO) {
        return Err(QueryError::Malformed(format!(
            "expected info reply, got type {:#04x}",
            reply.first().copied().unwrap_or_default()
        )));
    }
    let info = parse_info(&reply[1..])?;

    // The player list is optional; many servers hide it.
    let budget = (deadline.saturating_duration_since(Instant::now()) / 2).min(PLAYER_QUERY_TIMEOUT);
    let player_names = match tokio::time::timeout(budget, query_players(&socket)).await {
        Ok(Ok(names)) => names,
        Ok(Err(e)) => {
            debug!("Player list from {} unavailable: {}", addr, e);
            Vec::new()
        }
        Err(_) => {
            debug!("Player list from {} timed out", addr);
            Vec::new()
        }
    };

    Ok(QueryResponse {
        players: u32::from(info.players),
        max_players: u32::from(info.max_players),
        player_names,
        map: non_empty(info.map),
        version: info.version.and_then(non_empty),
        ping_ms: Some(ping.as_secs_f64() * 1000.0),
    })
}

async fn query_players(socket: &UdpSocket) -> Result<Vec<String>, QueryError> {
    let mut reply = request(socket, &player_request(NO_CHALLENGE)).await?;
    if reply.first() == Some(&S2C_CHALLENGE) {
        let challenge = challenge_of(&reply)?;
        reply = request(socket, &player_request(challenge)).await?;
    }

    if reply.first() != Some(&S2A_PLAYER) {
        return Err(QueryError::Malformed("expected player reply".to_string()));
    }
    Ok(parse_players(&reply[1..]))
}

/// Sends one packet and returns the reply without its 4-byte header.
async fn request(socket: &UdpSocket, packet: &[u8]) -> Result<Vec<u8>, QueryError> {
    socket.send(packet).await?;

    let mut buffer = vec![0u8; MAX_DATAGRAM];
    let len = socket.recv(&mut buffer).await?;
    buffer.truncate(len);

    if buffer.len() < 5 {
        return Err(QueryError::Malformed(format!("{} byte reply", buffer.len())));
    }
    if buffer[..4] == SPLIT_HEADER {
        return Err(QueryError::Malformed("split replies are not supported".to_string()));
    }
    if buffer[..4] != SIMPLE_HEADER {
        return Err(QueryError::Malformed("bad packet header".to_string()));
    }

    Ok(buffer.split_off(4))
}

pub fn info_request(challenge: Option<[u8; 4]>) -> Vec<u8> {
    let mut packet = Vec::with_capacity(29);
    packet.extend_from_slice(&SIMPLE_HEADER);
    packet.push(A2S_INFO);
    packet.extend_from_slice(INFO_PAYLOAD);
    if let Some(challenge) = challenge {
        packet.extend_from_slice(&challenge);
    }
    packet
}

pub fn player_request(challenge: [u8; 4]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(9);
    packet.extend_from_slice(&SIMPLE_HEADER);
    packet.push(A2S_PLAYER);
    packet.extend_from_slice(&challenge);
    packet
}

fn challenge_of(reply: &[u8]) -> Result<[u8; 4], QueryError> {
    reply
        .get(1..5)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| QueryError::Malformed("short challenge".to_string()))
}

/// Decodes an `S2A_INFO` body (everything after the type byte).
pub fn parse_info(body: &[u8]) -> Result<ServerInfo, QueryError> {
    let mut reader = Reader::new(body);
    let _protocol = reader.u8()?;
    let name = reader.cstring()?;
    let map = reader.cstring()?;
    let _folder = reader.cstring()?;
    let game = reader.cstring()?;
    let app_id = reader.u16_le()?;
    let players = reader.u8()?;
    let max_players = reader.u8()?;
    let bots = reader.u8()?;
    let _server_type = reader.u8()?;
    let _environment = reader.u8()?;
    let _visibility = reader.u8()?;
    let _vac = reader.u8()?;
    if app_id == THE_SHIP_APP_ID {
        reader.skip(3)?;
    }
    // Some servers truncate the tail of the reply.
    let version = reader.cstring().ok();

    Ok(ServerInfo {
        name,
        map,
        game,
        players,
        max_players,
        bots,
        version,
    })
}

/// Decodes an `S2A_PLAYER` body, keeping whatever entries are complete.
pub fn parse_players(body: &[u8]) -> Vec<String> {
    let mut reader = Reader::new(body);
    let Ok(count) = reader.u8() else {
        return Vec::new();
    };

    let mut names = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let entry = (|| {
            let _index = reader.u8()?;
            let name = reader.cstring()?;
            let _score = reader.i32_le()?;
            let _duration = reader.f32_le()?;
            Ok::<_, QueryError>(name)
        })();

        match entry {
            Ok(name) => names.push(name),
            Err(_) => break,
        }
    }
    names
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Little-endian cursor over a reply body.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], QueryError> {
        let end = self.pos + len;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| QueryError::Malformed("truncated reply".to_string()))?;
        self.pos = end;
        Ok(bytes)
    }

    fn skip(&mut self, len: usize) -> Result<(), QueryError> {
        self.take(len).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, QueryError> {
        Ok(self.take(1)?[0])
    }

    fn u16_le(&mut self) -> Result<u16, QueryError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn i32_le(&mut self) -> Result<i32, QueryError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn f32_le(&mut self) -> Result<f32, QueryError> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn cstring(&mut self) -> Result<String, QueryError> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| QueryError::Malformed("unterminated string".to_string()))?;
        let value = String::from_utf8_lossy(&rest[..nul]).into_owned();
        self.pos += nul + 1;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_body(players: u8, max_players: u8, app_id: u16) -> Vec<u8> {
        let mut body = vec![17];
        for s in ["My GMod Server", "gm_flatgrass", "garrysmod", "Sandbox"] {
            body.extend_from_slice(s.as_bytes());
            body.push(0);
        }
        body.extend_from_slice(&app_id.to_le_bytes());
        body.extend_from_slice(&[players, max_players, 1, b'd', b'l', 0, 1]);
        if app_id == THE_SHIP_APP_ID {
            body.extend_from_slice(&[0, 0, 0]);
        }
        body.extend_from_slice(b"2023.06.28\0");
        body
    }

    fn player_entry(body: &mut Vec<u8>, index: u8, name: &str) {
        body.push(index);
        body.extend_from_slice(name.as_bytes());
        body.push(0);
        body.extend_from_slice(&12i32.to_le_bytes());
        body.extend_from_slice(&93.5f32.to_le_bytes());
    }

    #[test]
    fn test_info_request_layout() {
        let packet = info_request(None);
        assert_eq!(&packet[..4], &SIMPLE_HEADER);
        assert_eq!(packet[4], A2S_INFO);
        assert_eq!(packet.len(), 25);
        assert_eq!(*packet.last().unwrap(), 0);

        let packet = info_request(Some([1, 2, 3, 4]));
        assert_eq!(packet.len(), 29);
        assert_eq!(&packet[25..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_player_request_layout() {
        assert_eq!(
            player_request(NO_CHALLENGE),
            vec![0xFF, 0xFF, 0xFF, 0xFF, A2S_PLAYER, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_parse_info() {
        let info = parse_info(&info_body(5, 24, 4000)).unwrap();
        assert_eq!(info.name, "My GMod Server");
        assert_eq!(info.map, "gm_flatgrass");
        assert_eq!(info.game, "Sandbox");
        assert_eq!(info.players, 5);
        assert_eq!(info.max_players, 24);
        assert_eq!(info.bots, 1);
        assert_eq!(info.version.as_deref(), Some("2023.06.28"));
    }

    #[test]
    fn test_parse_info_the_ship_extras() {
        let info = parse_info(&info_body(2, 8, THE_SHIP_APP_ID)).unwrap();
        assert_eq!(info.version.as_deref(), Some("2023.06.28"));
    }

    #[test]
    fn test_parse_info_without_version() {
        let mut body = info_body(0, 10, 4000);
        body.truncate(body.len() - 11);
        let info = parse_info(&body).unwrap();
        assert_eq!(info.version, None);
    }

    #[test]
    fn test_parse_info_truncated() {
        let body = info_body(0, 10, 4000);
        assert!(matches!(parse_info(&body[..10]), Err(QueryError::Malformed(_))));
    }

    #[test]
    fn test_parse_players() {
        let mut body = vec![3];
        player_entry(&mut body, 0, "Gordon");
        player_entry(&mut body, 1, "");
        player_entry(&mut body, 2, "Alyx");

        assert_eq!(parse_players(&body), vec!["Gordon", "", "Alyx"]);
    }

    #[test]
    fn test_parse_players_keeps_complete_entries() {
        let mut body = vec![2];
        player_entry(&mut body, 0, "Gordon");
        body.extend_from_slice(&[1, b'B', b'a']);

        assert_eq!(parse_players(&body), vec!["Gordon"]);
        assert!(parse_players(&[]).is_empty());
    }

    #[test]
    fn test_challenge_of() {
        assert_eq!(challenge_of(&[S2C_CHALLENGE, 9, 8, 7, 6]).unwrap(), [9, 8, 7, 6]);
        assert!(challenge_of(&[S2C_CHALLENGE, 9]).is_err());
    }
}
