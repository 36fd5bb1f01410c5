use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use common::error::AppError;
use regex::Regex;
use serde::Deserialize;

const VIDEOS_API: &str = "https://www.googleapis.com/youtube/v3/videos";
const TIMEDTEXT_API: &str = "https://video.google.com/timedtext";

static URL_IN_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s<>()\[\]]+").unwrap());
static ISO_DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").unwrap());
static TRACK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<track[^>]*lang_code="([^"]+)"[^>]*/?>"#).unwrap());
static CAPTION_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<text start="([0-9.]+)"(?: dur="([0-9.]+)")?[^>]*>(.*?)</text>"#).unwrap()
});

/// Full metadata document fetched from the YouTube Data API.
#[derive(Debug, Clone)]
pub struct YoutubeMetadata {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub description_urls: Vec<String>,
    pub channel_id: String,
    pub channel_title: String,
    pub published_at: Option<String>,
    pub duration: Option<String>,
    pub duration_seconds: Option<u64>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub tags: Vec<String>,
    pub thumbnails: HashMap<String, String>,
    pub fetched_at: String,
}

#[derive(Debug, Clone)]
pub struct TranscriptSegment {
    pub start: f64,
    pub duration: f64,
    pub text: String,
}

/// A fetched transcript: plain text for the pipeline, timestamped text for
/// the blob store.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub language: String,
    pub segments: Vec<TranscriptSegment>,
    pub full_text: String,
    pub timestamped_text: String,
}

#[derive(Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Deserialize)]
struct VideoItem {
    snippet: Snippet,
    #[serde(rename = "contentDetails")]
    content_details: Option<ContentDetails>,
    statistics: Option<Statistics>,
}

#[derive(Deserialize)]
struct Snippet {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "channelId", default)]
    channel_id: String,
    #[serde(rename = "channelTitle", default)]
    channel_title: String,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    thumbnails: HashMap<String, Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct Statistics {
    #[serde(rename = "viewCount")]
    view_count: Option<String>,
    #[serde(rename = "likeCount")]
    like_count: Option<String>,
}

/// YouTube Data API and timedtext client.
pub struct YoutubeFetcher {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl YoutubeFetcher {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    /// Fetch the full metadata document for a video. Fails when no API key
    /// is configured or the video is unknown.
    pub async fn fetch_metadata(&self, video_id: &str) -> Result<YoutubeMetadata, AppError> {
        let Some(api_key) = &self.api_key else {
            return Err(AppError::UpstreamFetch(
                "youtube api key not configured".into(),
            ));
        };

        let response = self
            .client
            .get(VIDEOS_API)
            .query(&[
                ("part", "snippet,contentDetails,statistics"),
                ("id", video_id),
                ("key", api_key),
            ])
            .timeout(Duration::from_secs(30))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::UpstreamFetch(format!("youtube metadata fetch failed: {e}")))?;

        let body: VideosResponse = response.json().await?;
        let Some(item) = body.items.into_iter().next() else {
            return Err(AppError::UpstreamFetch(format!(
                "video {video_id} not found"
            )));
        };

        let duration = item
            .content_details
            .as_ref()
            .and_then(|d| d.duration.clone());
        let duration_seconds = duration.as_deref().and_then(parse_iso8601_duration);

        Ok(YoutubeMetadata {
            video_id: video_id.to_owned(),
            description_urls: extract_urls(&item.snippet.description),
            title: item.snippet.title,
            description: item.snippet.description,
            channel_id: item.snippet.channel_id,
            channel_title: item.snippet.channel_title,
            published_at: item.snippet.published_at,
            duration,
            duration_seconds,
            view_count: item
                .statistics
                .as_ref()
                .and_then(|s| s.view_count.as_deref())
                .and_then(|v| v.parse().ok()),
            like_count: item
                .statistics
                .as_ref()
                .and_then(|s| s.like_count.as_deref())
                .and_then(|v| v.parse().ok()),
            tags: item.snippet.tags,
            thumbnails: item
                .snippet
                .thumbnails
                .into_iter()
                .map(|(kind, thumb)| (kind, thumb.url))
                .collect(),
            fetched_at: Utc::now().to_rfc3339(),
        })
    }

    /// Fetch the caption track for a video, preferring English.
    pub async fn fetch_transcript(&self, video_id: &str) -> Result<Transcript, AppError> {
        let track_list = self
            .client
            .get(TIMEDTEXT_API)
            .query(&[("type", "list"), ("v", video_id)])
            .timeout(Duration::from_secs(30))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::UpstreamFetch(format!("transcript track list failed: {e}")))?
            .text()
            .await?;

        let languages: Vec<String> = TRACK_RE
            .captures_iter(&track_list)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_owned())
            .collect();
        let language = languages
            .iter()
            .find(|l| l.starts_with("en"))
            .or_else(|| languages.first())
            .cloned()
            .ok_or_else(|| {
                AppError::UpstreamFetch(format!("no caption tracks for video {video_id}"))
            })?;

        let captions = self
            .client
            .get(TIMEDTEXT_API)
            .query(&[("lang", language.as_str()), ("v", video_id)])
            .timeout(Duration::from_secs(30))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::UpstreamFetch(format!("transcript fetch failed: {e}")))?
            .text()
            .await?;

        let transcript = parse_captions(&language, &captions);
        if transcript.segments.is_empty() {
            return Err(AppError::UpstreamFetch(format!(
                "empty transcript for video {video_id}"
            )));
        }
        Ok(transcript)
    }
}

fn parse_captions(language: &str, xml: &str) -> Transcript {
    let mut segments = Vec::new();
    for caps in CAPTION_TEXT_RE.captures_iter(xml) {
        let start: f64 = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0.0);
        let duration: f64 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0.0);
        let text = unescape_xml(caps.get(3).map(|m| m.as_str()).unwrap_or_default())
            .replace('\n', " ")
            .trim()
            .to_owned();
        if text.is_empty() {
            continue;
        }
        segments.push(TranscriptSegment {
            start,
            duration,
            text,
        });
    }

    let full_text = segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let timestamped_text = segments
        .iter()
        .map(|s| format!("[{}] {}", format_timestamp(s.start), s.text))
        .collect::<Vec<_>>()
        .join("\n");

    Transcript {
        language: language.to_owned(),
        segments,
        full_text,
        timestamped_text,
    }
}

fn format_timestamp(seconds: f64) -> String {
    let total = seconds as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

/// Pull every URL out of a video description.
pub fn extract_urls(text: &str) -> Vec<String> {
    URL_IN_TEXT_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_owned())
        .collect()
}

fn parse_iso8601_duration(duration: &str) -> Option<u64> {
    let caps = ISO_DURATION_RE.captures(duration)?;
    let hours: u64 = caps.get(1).map_or(0, |m| m.as_str().parse().unwrap_or(0));
    let minutes: u64 = caps.get(2).map_or(0, |m| m.as_str().parse().unwrap_or(0));
    let seconds: u64 = caps.get(3).map_or(0, |m| m.as_str().parse().unwrap_or(0));
    Some(hours * 3600 + minutes * 60 + seconds)
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
