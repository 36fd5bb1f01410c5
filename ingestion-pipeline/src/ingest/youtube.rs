use common::storage::types::content::Content;
use serde_json::Value;

use crate::fetchers::youtube::{Transcript, YoutubeMetadata};

pub fn transcript_path(video_id: &str) -> String {
    format!("youtube/{video_id}/transcript.txt")
}

pub fn metadata_path(video_id: &str) -> String {
    format!("youtube/{video_id}/metadata.json")
}

pub fn placeholder_title(video_id: &str) -> String {
    format!("YouTube: {video_id}")
}

/// Whether an existing record was ingested without Data API metadata: a
/// placeholder or empty title, or no channel info.
pub fn has_incomplete_metadata(existing: &Content, video_id: &str) -> bool {
    if existing.title == placeholder_title(video_id) || existing.title.is_empty() {
        return true;
    }
    !existing
        .metadata
        .get("channel_title")
        .and_then(|v| v.as_str())
        .is_some_and(|title| !title.is_empty())
}

/// The content-record metadata map for a YouTube source.
pub fn content_metadata(
    video_id: &str,
    resource_key: &str,
    transcript: Option<&Transcript>,
    fetched: Option<&YoutubeMetadata>,
) -> Value {
    serde_json::json!({
        "video_id": video_id,
        "resource_key": resource_key,
        "language": transcript.map(|t| t.language.clone()),
        "segment_count": transcript.map_or(0, |t| t.segments.len()),
        "published_at": fetched.and_then(|m| m.published_at.clone()),
        "fetched_at": fetched.map(|m| m.fetched_at.clone()),
        "channel_id": fetched.map(|m| m.channel_id.clone()),
        "channel_title": fetched.map(|m| m.channel_title.clone()),
        "duration_seconds": fetched.and_then(|m| m.duration_seconds),
        "view_count": fetched.and_then(|m| m.view_count),
        "like_count": fetched.and_then(|m| m.like_count),
        "description_urls": fetched.map_or_else(Vec::new, |m| m.description_urls.clone()),
    })
}

/// The full `metadata.json` document stored next to the transcript.
#[allow(clippy::too_many_arguments)]
pub fn blob_metadata_document(
    content_id: &str,
    video_id: &str,
    title: &str,
    fetched: Option<&YoutubeMetadata>,
    language: &str,
    segment_count: usize,
    transcript_length: usize,
    file_size: u64,
    author: &str,
    created_at: Option<String>,
) -> Value {
    serde_json::json!({
        "id": content_id,
        "video_id": video_id,
        "title": title,
        "description": fetched.map(|m| m.description.clone()),
        "description_urls": fetched.map_or_else(Vec::new, |m| m.description_urls.clone()),
        "channel_id": fetched.map(|m| m.channel_id.clone()),
        "channel_title": fetched.map(|m| m.channel_title.clone()),
        "published_at": fetched.and_then(|m| m.published_at.clone()),
        "duration": fetched.and_then(|m| m.duration.clone()),
        "duration_seconds": fetched.and_then(|m| m.duration_seconds),
        "view_count": fetched.and_then(|m| m.view_count),
        "like_count": fetched.and_then(|m| m.like_count),
        "tags": fetched.map_or_else(Vec::new, |m| m.tags.clone()),
        "thumbnails": fetched.map(|m| m.thumbnails.clone()),
        "language": language,
        "segment_count": segment_count,
        "transcript_length": transcript_length,
        "file_size": file_size,
        "author": author,
        "created_at": created_at,
        "fetched_at": fetched.map(|m| m.fetched_at.clone()),
    })
}
