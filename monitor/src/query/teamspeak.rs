//! TeamSpeak 3 ServerQuery (line based, TCP).
//!
//! The query interface listens on its own port; `use port=<voice port>`
//! selects the virtual server the endpoint refers to. Replies are a data
//! line followed by `error id=<n> msg=<text>`.

use super::{resolve, QueryError, QueryResponse};
use log::debug;
use std::collections::HashMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::time::Instant;

const BANNER: &str = "TS3";
const WELCOME_PREFIX: &str = "Welcome to the TeamSpeak";
/// `client_type` of ServerQuery connections, which are not players.
const QUERY_CLIENT_TYPE: &str = "1";

pub async fn query(host: &str, query_port: u16, voice_port: u16) -> Result<QueryResponse, QueryError> {
    let addr = resolve(host, query_port).await?;
    let stream = TcpStream::connect(addr).await?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let banner = next_line(&mut lines).await?;
    if !banner.starts_with(BANNER) {
        return Err(QueryError::Malformed("not a ServerQuery interface".to_string()));
    }

    command(&mut writer, &mut lines, &format!("use port={}", voice_port)).await?;

    let started = Instant::now();
    let info = command(&mut writer, &mut lines, "serverinfo").await?;
    let ping = started.elapsed();
    let properties = info.first().map(|line| parse_properties(line)).unwrap_or_default();

    let player_names = match command(&mut writer, &mut lines, "clientlist").await {
        Ok(data) => parse_client_list(&data.join("|")),
        Err(e) => {
            debug!("Client list from {} unavailable: {}", addr, e);
            Vec::new()
        }
    };
    let _ = writer.write_all(b"quit\n").await;

    let number = |key: &str| {
        properties
            .get(key)
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0)
    };

    Ok(QueryResponse {
        players: number("virtualserver_clientsonline")
            .saturating_sub(number("virtualserver_queryclientsonline")),
        max_players: number("virtualserver_maxclients"),
        player_names,
        map: None,
        version: properties.get("virtualserver_version").cloned(),
        ping_ms: Some(ping.as_secs_f64() * 1000.0),
    })
}

/// Sends one command and collects its data lines up to the status line.
async fn command<W, R>(
    writer: &mut W,
    lines: &mut Lines<R>,
    command: &str,
) -> Result<Vec<String>, QueryError>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    writer.write_all(format!("{}\n", command).as_bytes()).await?;

    let mut data = Vec::new();
    loop {
        let line = next_line(lines).await?;
        if line.starts_with(WELCOME_PREFIX) {
            continue;
        }
        if let Some(status) = line.strip_prefix("error ") {
            let status = parse_properties(status);
            return match status.get("id").map(String::as_str) {
                Some("0") => Ok(data),
                _ => Err(QueryError::Rejected(format!(
                    "{}: {}",
                    command,
                    status.get("msg").map(String::as_str).unwrap_or("unknown error")
                ))),
            };
        }
        data.push(line);
    }
}

/// Next non-blank line with the `\r` of the `\n\r` terminator removed.
async fn next_line<R: AsyncBufRead + Unpin>(lines: &mut Lines<R>) -> Result<String, QueryError> {
    loop {
        match lines.next_line().await? {
            Some(line) => {
                let line = line.trim_matches('\r').trim();
                if !line.is_empty() {
                    return Ok(line.to_string());
                }
            }
            None => return Err(QueryError::Malformed("connection closed".to_string())),
        }
    }
}

/// Parses `key=value` pairs separated by spaces, unescaping values.
pub fn parse_properties(line: &str) -> HashMap<String, String> {
    line.split(' ')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), unescape(value)),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// Nicknames of voice clients in a `clientlist` reply (entries split by `|`).
pub fn parse_client_list(data: &str) -> Vec<String> {
    data.split('|')
        .map(parse_properties)
        .filter(|client| client.get("client_type").map(String::as_str) != Some(QUERY_CLIENT_TYPE))
        .filter_map(|mut client| client.remove("client_nickname"))
        .collect()
}

pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some('p') => out.push('|'),
            Some('/') => out.push('/'),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('v') => out.push('\u{0B}'),
            Some('f') => out.push('\u{0C}'),
            Some('b') => out.push('\u{08}'),
            Some('a') => out.push('\u{07}'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"My\sServer\p1"), "My Server|1");
        assert_eq!(unescape(r"a\/b\\c"), r"a/b\c");
        assert_eq!(unescape("plain"), "plain");
        assert_eq!(unescape(r"trailing\"), r"trailing\");
    }

    #[test]
    fn test_parse_properties() {
        let props = parse_properties(
            r"virtualserver_name=Clan\sHQ virtualserver_clientsonline=5 virtualserver_maxclients=32 virtualserver_flag_password",
        );
        assert_eq!(props["virtualserver_name"], "Clan HQ");
        assert_eq!(props["virtualserver_clientsonline"], "5");
        assert_eq!(props["virtualserver_maxclients"], "32");
        assert_eq!(props["virtualserver_flag_password"], "");
    }

    #[test]
    fn test_parse_client_list_skips_query_clients() {
        let data = r"clid=1 cid=1 client_database_id=1 client_nickname=serveradmin client_type=1|clid=4 cid=1 client_database_id=7 client_nickname=Big\sBoss client_type=0|clid=5 cid=2 client_database_id=9 client_nickname=rookie client_type=0";
        assert_eq!(parse_client_list(data), vec!["Big Boss", "rookie"]);
    }

    #[tokio::test]
    async fn test_command_collects_data_until_status() {
        let replies: &[u8] = b"Welcome to the TeamSpeak 3 ServerQuery interface.\n\rvirtualserver_maxclients=32\n\rerror id=0 msg=ok\n\r";
        let mut lines = BufReader::new(replies).lines();
        let mut sent: Vec<u8> = Vec::new();

        let data = command(&mut sent, &mut lines, "serverinfo").await.unwrap();
        assert_eq!(data, vec!["virtualserver_maxclients=32"]);
        assert_eq!(sent, b"serverinfo\n");
    }

    #[tokio::test]
    async fn test_command_rejected() {
        let replies: &[u8] = b"error id=1024 msg=invalid\\sserverID\n\r";
        let mut lines = BufReader::new(replies).lines();
        let mut sent: Vec<u8> = Vec::new();

        let result = command(&mut sent, &mut lines, "use port=1").await;
        match result {
            Err(QueryError::Rejected(msg)) => assert_eq!(msg, "use port=1: invalid serverID"),
            other => panic!("expected rejection, got {:?}", other),
        }
    }
}
