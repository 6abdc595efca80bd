use serde::{Deserialize, Serialize};

use crate::media::StreamKind;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QueryViewer {
    pub user: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct QueryList {
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StartCache {
    pub id: String,
    pub media_type: StreamKind,
    pub url: String,
    pub user: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub series_title: Option<String>,
    #[serde(default)]
    pub season: Option<i32>,
    #[serde(default)]
    pub episode: Option<i32>,
    #[serde(default)]
    pub ttl_days: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CreateLink {
    pub user: String,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}
