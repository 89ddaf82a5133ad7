use std::fmt;

/// Which way a packet travels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sent from the server to the client
    Clientbound,

    /// Sent from the client to the server
    Serverbound,
}

impl Direction {
    /// The token used in modern packet names, e.g. `Clientbound`
    pub fn modern_token(self) -> &'static str {
        match self {
            Direction::Clientbound => "Clientbound",
            Direction::Serverbound => "Serverbound",
        }
    }

    /// The token used in legacy packet names, e.g. `Out`
    pub fn legacy_token(self) -> &'static str {
        match self {
            Direction::Clientbound => "Out",
            Direction::Serverbound => "In",
        }
    }

    /// Look up a direction by either its modern or legacy token
    pub fn from_token(token: &str) -> Option<Direction> {
        match token {
            "Clientbound" | "Out" => Some(Direction::Clientbound),
            "Serverbound" | "In" => Some(Direction::Serverbound),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Direction::Clientbound => "CLIENTBOUND",
            Direction::Serverbound => "SERVERBOUND",
        })
    }
}
