//! Room codes: the short, human-shareable rendezvous id for a session.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use thiserror::Error;

/// Characters a room code is drawn from. No `I`, `O`, `0` or `1`.
pub const ROOM_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const ROOM_CODE_LEN: usize = 6;

/// Prefix of every endpoint name registered in a directory.
pub const ENDPOINT_PREFIX: &str = "nexus-";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room code must be {expected} characters, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("Invalid character '{0}' in room code")]
    InvalidChar(char),
}

/// Validated 6-character room code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode(String);

impl RoomCode {
    pub fn generate() -> Self {
        let alphabet = ROOM_ALPHABET.as_bytes();
        let mut rng = rand::rng();
        let code = (0..ROOM_CODE_LEN)
            .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name the host registers under: `"nexus-" + code`.
    pub fn endpoint_name(&self) -> String {
        format!("{ENDPOINT_PREFIX}{}", self.0)
    }
}

impl FromStr for RoomCode {
    type Err = RoomError;

    /// Trims surrounding whitespace and upper-cases before validating.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        let actual = code.chars().count();
        if actual != ROOM_CODE_LEN {
            return Err(RoomError::Length {
                expected: ROOM_CODE_LEN,
                actual,
            });
        }
        if let Some(bad) = code.chars().find(|c| !ROOM_ALPHABET.contains(*c)) {
            return Err(RoomError::InvalidChar(bad));
        }
        Ok(Self(code))
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Endpoint name a guest registers under so it can accept inbound dials.
pub fn guest_endpoint_name(peer_id: &str) -> String {
    format!("{ENDPOINT_PREFIX}peer-{peer_id}")
}
