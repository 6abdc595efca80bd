use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of upstream content behind a stream id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Live,
    Movie,
    Series,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Live => "live",
            StreamKind::Movie => "movie",
            StreamKind::Series => "series",
        }
    }

    /// Movies and episodes are fetched with a strict header set
    pub fn is_on_demand(&self) -> bool {
        !matches!(self, StreamKind::Live)
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(StreamKind::Live),
            "movie" => Ok(StreamKind::Movie),
            "series" => Ok(StreamKind::Series),
            _ => Err(()),
        }
    }
}

/// VOD cache entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VodStatus {
    /// Background fetch in progress
    Downloading,
    /// File complete on disk
    Ready,
    /// Fetch aborted; row kept until its short expiry
    Failed,
}

impl std::fmt::Display for VodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VodStatus::Downloading => write!(f, "downloading"),
            VodStatus::Ready => write!(f, "ready"),
            VodStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for VodStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "downloading" => Ok(VodStatus::Downloading),
            "ready" => Ok(VodStatus::Ready),
            "failed" => Ok(VodStatus::Failed),
            _ => Err(()),
        }
    }
}
