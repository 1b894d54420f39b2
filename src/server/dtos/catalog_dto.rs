use serde::{Deserialize, Serialize};

/// shapes follow the catalog json api (kisskh style), field names are kept on the wire so the
/// frontend can read upstream and proxied payloads the same way

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub episodes_count: i64,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "favoriteID")]
    pub favorite_id: i64,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtitleTrack {
    pub src: String,
    #[serde(default)]
    pub label: String,
    // upstream really spells it "land"
    #[serde(default, rename = "land", alias = "lang")]
    pub lang: String,
    #[serde(default)]
    pub default: bool,
}

/// `src` and `subtitles` are only filled by the deep scraper, each by the worker that owns
/// this episode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Episode {
    pub id: i64,
    pub number: f64,
    #[serde(default)]
    pub sub: i64,
    #[serde(default, rename = "src", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtitles: Vec<SubtitleTrack>,
}

impl Episode {
    pub fn is_complete(&self) -> bool {
        self.source.is_some() && !self.subtitles.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeriesDetail {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub trailer: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default, rename = "nextEpDateID")]
    pub next_ep_date_id: i64,
    #[serde(default)]
    pub episodes: Vec<Episode>,
    #[serde(default)]
    pub episodes_count: i64,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "favoriteID")]
    pub favorite_id: i64,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesResponse {
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesDetailsResponse {
    pub series_details: Vec<SeriesDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesDeepDetailsResponse {
    pub series_deep_details: Vec<SeriesDetail>,
}
