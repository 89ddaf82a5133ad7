use std::fmt;

/// The protocol phase a packet belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// The initial handshake
    Handshake,

    /// Authentication and identity exchange
    Login,

    /// Regular gameplay traffic
    Play,

    /// Server list status queries
    Query,

    /// The stage could not be determined from the packet name
    Unknown,
}

impl Stage {
    /// The token used for this stage in legacy packet names
    pub fn legacy_token(self) -> &'static str {
        match self {
            Stage::Handshake => "Handshaking",
            Stage::Login => "Login",
            Stage::Play => "Play",
            Stage::Query => "Status",
            Stage::Unknown => "",
        }
    }

    /// Look up a stage by its legacy token, defaulting to `Stage::Unknown`
    pub fn from_legacy_token(token: &str) -> Stage {
        match token {
            "Handshaking" => Stage::Handshake,
            "Login" => Stage::Login,
            "Play" => Stage::Play,
            "Status" => Stage::Query,
            _ => Stage::Unknown,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Stage::Handshake => "HANDSHAKE",
            Stage::Login => "LOGIN",
            Stage::Play => "PLAY",
            Stage::Query => "QUERY",
            Stage::Unknown => "UNKNOWN",
        })
    }
}
