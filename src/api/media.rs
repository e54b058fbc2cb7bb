//! Media uploads and speech transcription
//!
//! Uploads are two-step: the backend issues a presigned storage URL, then
//! the file body is PUT there directly, bypassing the API server.

use std::path::Path;

use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use super::client::{field, ApiError, ChatClient};
use crate::models::{MediaItem, MediaType};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadTarget {
    upload_url: String,
    file_key: String,
}

/// Pick a MIME type from the file extension, else the media kind's default.
fn guess_mime(path: &Path, kind: MediaType) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("m4a") => "audio/m4a",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("aac") => "audio/aac",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        _ => kind.default_mime(),
    }
}

fn file_name_of(path: &Path, kind: MediaType) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(String::from)
        .unwrap_or_else(|| kind.default_file_name().to_string())
}

/// Strip the signature query from a presigned URL, leaving the object URL.
fn object_url(upload_url: &str) -> String {
    upload_url
        .split('?')
        .next()
        .unwrap_or(upload_url)
        .to_string()
}

/// Upload a local file to storage and describe it as an attachment.
pub async fn upload_media(
    client: &ChatClient,
    path: &Path,
    kind: MediaType,
) -> Result<MediaItem, ApiError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        ApiError::Validation(format!("Cannot read {}: {}", path.display(), e))
    })?;
    let file_name = file_name_of(path, kind);
    let mime_type = guess_mime(path, kind);
    let file_size = bytes.len() as u64;

    // 1. Presigned URL
    let req = json!({
        "fileName": file_name,
        "fileType": mime_type,
        "mediaType": kind.as_str(),
        "fileSize": file_size,
    });
    let body = client.post("/media/upload-url", Some(&req)).await?;
    let target: UploadTarget = serde_json::from_value(body)?;

    // 2. Direct PUT of the raw body
    tracing::debug!("PUT {} ({} bytes)", object_url(&target.upload_url), file_size);
    let resp = client
        .http()
        .put(&target.upload_url)
        .header(reqwest::header::CONTENT_TYPE, mime_type)
        .body(bytes)
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(ApiError::Http {
            status: status.as_u16(),
            message: format!("storage upload failed: {}", text),
        });
    }

    Ok(MediaItem {
        media_type: kind,
        key: target.file_key,
        url: Some(object_url(&target.upload_url)),
        file_name: Some(file_name),
        file_size: Some(file_size),
        duration: None,
        width: None,
        height: None,
        mime_type: Some(mime_type.to_string()),
    })
}

/// Upload a small file inline (base64 in JSON) through the API server.
///
/// Used for short voice clips where a presigned round trip is not worth it.
pub async fn upload_inline(
    client: &ChatClient,
    path: &Path,
    kind: MediaType,
) -> Result<MediaItem, ApiError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        ApiError::Validation(format!("Cannot read {}: {}", path.display(), e))
    })?;
    let file_name = file_name_of(path, kind);
    let mime_type = guess_mime(path, kind);

    let req = json!({
        "file": base64::engine::general_purpose::STANDARD.encode(&bytes),
        "fileName": file_name,
        "mimeType": mime_type,
    });
    let mut body = client.post("/upload", Some(&req)).await?;

    Ok(MediaItem {
        media_type: kind,
        key: field(&mut body, "key")?,
        url: field(&mut body, "url").ok(),
        file_name: Some(file_name),
        file_size: Some(bytes.len() as u64),
        duration: None,
        width: None,
        height: None,
        mime_type: Some(mime_type.to_string()),
    })
}

/// Transcribe a recorded audio file to text.
pub async fn transcribe_audio(client: &ChatClient, path: &Path) -> Result<String, ApiError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        ApiError::Validation(format!("Cannot read {}: {}", path.display(), e))
    })?;
    let file_name = file_name_of(path, MediaType::Audio);
    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(guess_mime(path, MediaType::Audio))?;
    let form = reqwest::multipart::Form::new().part("file", part);

    let mut body = client.post_multipart("/transcribe", form).await?;
    let text: String = field(&mut body, "text")?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime(Path::new("a/b/photo.PNG"), MediaType::Image), "image/png");
        assert_eq!(guess_mime(Path::new("voice"), MediaType::Audio), "audio/m4a");
        assert_eq!(guess_mime(Path::new("clip.mov"), MediaType::Video), "video/quicktime");
    }

    #[test]
    fn test_file_name_fallback() {
        assert_eq!(file_name_of(Path::new("/tmp/x.jpg"), MediaType::Image), "x.jpg");
        assert_eq!(file_name_of(Path::new("/"), MediaType::Audio), "file.m4a");
    }

    #[test]
    fn test_object_url_strips_signature() {
        assert_eq!(
            object_url("https://bucket.s3/k/a.jpg?X-Amz-Signature=abc&X-Amz-Expires=60"),
            "https://bucket.s3/k/a.jpg"
        );
        assert_eq!(object_url("https://bucket.s3/k"), "https://bucket.s3/k");
    }

    #[test]
    fn test_upload_target_wire_names() {
        let t: UploadTarget = serde_json::from_str(
            r#"{"ok":true,"uploadUrl":"https://s3/put?sig","fileKey":"media/1.jpg"}"#,
        )
        .unwrap();
        assert_eq!(t.file_key, "media/1.jpg");
    }
}
