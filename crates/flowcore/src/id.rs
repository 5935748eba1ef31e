use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque 128-bit identifier shared by graph, list and overlay entities.
///
/// Ids created with [`Id::now`] are time-ordered (UUIDv7 with a per-process
/// counter), so sorting by id equals sorting by creation order. The byte
/// encoding is the big-endian UUID layout and is what the store persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(Uuid);

impl Id {
    /// New id that sorts after every id previously created in this process.
    pub fn now() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse the stable byte encoding; `None` unless exactly 16 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        Uuid::from_slice(bytes).ok().map(Self)
    }
}

impl Default for Id {
    fn default() -> Self {
        Self(Uuid::nil())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Id {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for Id {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ids_are_monotonic() {
        let ids: Vec<Id> = (0..256).map(|_| Id::now()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn byte_encoding_is_stable() {
        let id = Id::now();
        assert_eq!(Id::from_slice(id.as_bytes()), Some(id));
        assert_eq!(Id::from_slice(&[0u8; 3]), None);
        assert_eq!(id.to_string().parse::<Id>().ok(), Some(id));
    }
}
