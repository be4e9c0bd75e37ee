use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Identifier of a room on the destination homeserver.
///
/// Always non-empty; an empty string is represented as `Option::None`
/// wherever a room id may be missing, never as `RoomId("")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() { None } else { Some(Self(id)) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("not a valid mxc:// URI")]
pub struct InvalidContentUri;

/// Content-addressable URI of an uploaded asset, `mxc://<server>/<media id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentUri {
    pub server_name: String,
    pub media_id: String,
}

impl FromStr for ContentUri {
    type Err = InvalidContentUri;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("mxc://").ok_or(InvalidContentUri)?;
        let (server_name, media_id) = rest.split_once('/').ok_or(InvalidContentUri)?;
        if server_name.is_empty() || media_id.is_empty() || media_id.contains('/') {
            return Err(InvalidContentUri);
        }
        Ok(Self {
            server_name: server_name.to_owned(),
            media_id: media_id.to_owned(),
        })
    }
}

impl fmt::Display for ContentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mxc://{}/{}", self.server_name, self.media_id)
    }
}

impl Serialize for ContentUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
