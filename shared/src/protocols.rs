//! Static protocol registry: which game protocol lives on which port, how it
//! is labelled, and which wire format answers a status query for it.

/// Protocols tried, in this order, when a port has no known mapping.
pub const AUTO_DETECT_CANDIDATES: [&str; 8] = [
    "garrysmod",
    "minecraft",
    "csgo",
    "arma3",
    "rust",
    "valheim",
    "teamspeak",
    "unturned",
];

/// TeamSpeak 3 ServerQuery listens here regardless of the voice port.
pub const TEAMSPEAK_QUERY_PORT: u16 = 10011;

/// Wire format used to query a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFamily {
    /// Valve A2S over UDP. Some games answer on `game port + offset`.
    Source { port_offset: u16 },
    /// Minecraft Java server list ping over TCP.
    Minecraft,
    /// TeamSpeak 3 ServerQuery; the endpoint port selects the virtual server.
    TeamSpeak3 { query_port: u16 },
    /// Listed for labelling only, no structured query is implemented.
    Unsupported,
}

/// Label shown for a port, e.g. `"Minecraft"` for 25565 and `"Port 8080"`
/// for anything unmapped.
pub fn label_for_port(port: u16) -> String {
    match port_entry(port) {
        Some((_, label)) => label.to_string(),
        None => format!("Port {}", port),
    }
}

/// Protocol to query on `port`, or `None` when the port is not a known game
/// port and auto-detection should run instead.
pub fn protocol_id_for_port(port: u16) -> Option<&'static str> {
    port_entry(port).and_then(|(id, _)| id)
}

/// Full name of a protocol, falling back to the identifier itself.
pub fn display_name_for_protocol_id(id: &str) -> &str {
    match id {
        "garrysmod" => "Garry's Mod",
        "minecraft" => "Minecraft",
        "scpsl" => "SCP: Secret Laboratory",
        "csgo" => "Counter-Strike: Global Offensive",
        "arma3" => "Arma 3",
        "valheim" => "Valheim",
        "rust" => "Rust",
        "7d2d" => "7 Days to Die",
        "beamng" => "BeamNG.drive",
        "satisfactory" => "Satisfactory",
        "left4dead2" => "Left 4 Dead 2",
        "teamspeak" => "TeamSpeak 3",
        "teamspeak2" => "TeamSpeak 2",
        "unturned" => "Unturned",
        "halo" => "Halo",
        "mongodb" => "MongoDB",
        other => other,
    }
}

/// Wire format for a protocol identifier, `None` if the identifier is unknown.
pub fn query_family(id: &str) -> Option<QueryFamily> {
    let family = match id {
        "garrysmod" | "csgo" | "rust" | "left4dead2" => QueryFamily::Source { port_offset: 0 },
        "arma3" | "valheim" | "7d2d" | "unturned" => QueryFamily::Source { port_offset: 1 },
        "minecraft" => QueryFamily::Minecraft,
        "teamspeak" => QueryFamily::TeamSpeak3 {
            query_port: TEAMSPEAK_QUERY_PORT,
        },
        "scpsl" | "beamng" | "satisfactory" | "halo" | "teamspeak2" | "mongodb" => {
            QueryFamily::Unsupported
        }
        _ => return None,
    };
    Some(family)
}

/// Default display name for a newly added endpoint.
pub fn default_display_name(host: &str, port: u16) -> String {
    format!("{} - {}", label_for_port(port), host)
}

// Web ports are labelled but carry no protocol id, so they go through
// auto-detection like any unmapped port.
fn port_entry(port: u16) -> Option<(Option<&'static str>, &'static str)> {
    let entry = match port {
        27015 | 27016 => (Some("garrysmod"), "Garry's Mod"),
        25565 | 25566 => (Some("minecraft"), "Minecraft"),
        7777 | 7778 => (Some("scpsl"), "SCP:SL"),
        7779 => (Some("beamng"), "BeamNG.drive"),
        7780 => (Some("satisfactory"), "Satisfactory"),
        80 => (None, "Web Server"),
        443 => (None, "Web Server (HTTPS)"),
        27005 | 27025 => (Some("csgo"), "CS:GO"),
        2302 | 2303 => (Some("arma3"), "Arma 3"),
        2456 | 2457 => (Some("valheim"), "Valheim"),
        16261 | 28015 => (Some("rust"), "Rust"),
        22125 | 26900 => (Some("7d2d"), "7 Days to Die"),
        3074 => (Some("halo"), "Halo"),
        27036 => (Some("left4dead2"), "Left 4 Dead 2"),
        9987 => (Some("teamspeak"), "Teamspeak"),
        10011 => (Some("teamspeak2"), "Teamspeak"),
        27500 => (Some("unturned"), "Unturned"),
        27017 => (Some("mongodb"), "MongoDB"),
        _ => return None,
    };
    Some(entry)
}
