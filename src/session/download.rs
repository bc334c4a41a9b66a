//! Subtitle download and decoding
//!
//! The server sends the subtitle gzip-compressed and base64-encoded. The
//! decoded text is written next to the video as `<name>.<lang>.srt`.

use std::io::Read;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::read::GzDecoder;
use log::{debug, info};

use super::SessionManager;
use crate::api::{ensure_ok, Value};
use crate::error::{Result, SubtleError};
use crate::models::{SubtitleCandidate, VideoIdentity};

/// Where the subtitle for `video` in `language` is saved
///
/// The last four characters of the file name (normally `.mkv` or `.avi`)
/// are replaced by `.<language>.srt`.
pub fn subtitle_path(video: &VideoIdentity, language: &str) -> PathBuf {
    let name = video.file_name();
    let keep = name.chars().count().saturating_sub(4);
    let base: String = name.chars().take(keep).collect();
    video.directory().join(format!("{}.{}.srt", base, language))
}

/// base64 text to subtitle text
pub fn decode_payload(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let compressed = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| SubtleError::Decode(format!("invalid base64: {}", e)))?;
    gunzip_utf8(&compressed)
}

/// gzip bytes to UTF-8 text
pub fn gunzip_utf8(compressed: &[u8]) -> Result<String> {
    let mut raw = Vec::new();
    GzDecoder::new(compressed)
        .read_to_end(&mut raw)
        .map_err(|e| SubtleError::Decode(format!("invalid gzip data: {}", e)))?;
    String::from_utf8(raw).map_err(|e| SubtleError::Decode(format!("not UTF-8 text: {}", e)))
}

impl SessionManager {
    /// Fetch `candidate` and save it beside `video`
    ///
    /// The file is only written once the payload decoded cleanly. An existing
    /// file at the same path is overwritten.
    pub async fn download(
        &self,
        video: &VideoIdentity,
        candidate: &SubtitleCandidate,
    ) -> Result<PathBuf> {
        if candidate.video_id != video.id() {
            return Err(SubtleError::ContractViolation(format!(
                "subtitle {} was not found for {}",
                candidate.download_id,
                video.file_name()
            )));
        }

        if !self.is_logged_in() {
            return Err(SubtleError::NotLoggedIn);
        }
        let token = self.token()?;

        info!("Downloading subtitle {}...", candidate);
        let response = self
            .inner
            .rpc
            .call(
                "DownloadSubtitles",
                &[
                    Value::from(token),
                    Value::Array(vec![Value::from(candidate.download_id.to_string())]),
                ],
            )
            .await?;
        let body = ensure_ok(&response)?;

        let payload = body
            .get("data")
            .and_then(Value::as_array)
            .and_then(|files| files.first())
            .and_then(|file| file.get("data"))
            .ok_or_else(|| SubtleError::Malformed("download response without data".to_string()))?;

        let text = match payload {
            Value::String(encoded) => decode_payload(encoded)?,
            Value::Base64(compressed) => gunzip_utf8(compressed)?,
            other => {
                return Err(SubtleError::Malformed(format!(
                    "unexpected subtitle payload: {:?}",
                    other
                )))
            }
        };
        debug!("Decoded {} bytes of subtitle text", text.len());

        let language = if candidate.iso639.is_empty() {
            candidate.language_id.as_str()
        } else {
            candidate.iso639.as_str()
        };
        let path = subtitle_path(video, language);
        write_subtitle(&path, &text)?;

        info!("Subtitle saved to {}", path.display());
        Ok(path)
    }
}

fn write_subtitle(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_subtitle_path_replaces_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Movie.Name.avi");
        std::fs::write(&file, b"x").unwrap();
        let video = VideoIdentity::open(&file).unwrap();

        let path = subtitle_path(&video, "en");
        assert_eq!(path.file_name().unwrap(), "Movie.Name.en.srt");
        assert_eq!(path.parent().unwrap(), video.directory());
    }

    #[test]
    fn test_subtitle_path_counts_characters() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Amélie.mkv");
        std::fs::write(&file, b"x").unwrap();
        let video = VideoIdentity::open(&file).unwrap();

        assert_eq!(
            subtitle_path(&video, "fr").file_name().unwrap(),
            "Amélie.fr.srt"
        );
    }

    #[test]
    fn test_decode_payload() {
        let text = "1\n00:00:01,000 --> 00:00:02,000\nHéllo\n";
        let encoded = STANDARD.encode(gzip(text.as_bytes()));
        assert_eq!(decode_payload(&encoded).unwrap(), text);

        // Servers wrap long base64 lines
        let wrapped: String = encoded
            .as_bytes()
            .chunks(20)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(decode_payload(&wrapped).unwrap(), text);
    }

    #[test]
    fn test_decode_payload_errors() {
        assert!(matches!(decode_payload("%%%"), Err(SubtleError::Decode(_))));

        let not_gzip = STANDARD.encode(b"plain text");
        assert!(matches!(decode_payload(&not_gzip), Err(SubtleError::Decode(_))));

        let latin1 = STANDARD.encode(gzip(&[0x48, 0xe9, 0x6c, 0x6c, 0x6f]));
        assert!(matches!(decode_payload(&latin1), Err(SubtleError::Decode(_))));
    }
}
