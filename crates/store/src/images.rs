//! Upload intake for user-submitted screenshots and photos.
//!
//! Accepts a `data:image/...;base64,` URL or a bare base64 body. Validation
//! is two-step: the declared MIME must be on the allow-list, then the
//! decoded bytes must open with the matching magic numbers. The magic bytes
//! decide the stored extension; a declared MIME that contradicts them is a
//! rejection, not a warning.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::Rng;

use tb_domain::conversation::ConversationId;
use tb_domain::trace::TraceEvent;
use tb_domain::{Error, Result};

const ALLOWED_MIME: &[&str] = &["jpeg", "jpg", "png", "gif", "webp"];

pub struct ImageIntake {
    uploads_dir: PathBuf,
    max_bytes: usize,
}

/// A stored upload, ready to be referenced from the transcript.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub filename: String,
    /// Path component served by `GET /images/:id/:file`.
    pub url_path: String,
    pub bytes: usize,
    pub ext: &'static str,
}

impl ImageIntake {
    pub fn new(uploads_dir: &Path, max_bytes: usize) -> Result<Self> {
        std::fs::create_dir_all(uploads_dir)?;
        Ok(Self {
            uploads_dir: uploads_dir.to_path_buf(),
            max_bytes,
        })
    }

    /// Validate and persist one upload under `<uploads>/<ID>/`.
    pub fn store(&self, id: &ConversationId, payload: &str) -> Result<StoredImage> {
        let (declared_mime, body) = split_data_url(payload);

        if let Some(mime) = declared_mime {
            if !ALLOWED_MIME.contains(&mime) {
                return Err(Error::Validation(format!("unsupported image type: {mime}")));
            }
        }

        let decoded = STANDARD
            .decode(body.trim())
            .map_err(|_| Error::Validation("image payload is not valid base64".into()))?;

        if decoded.len() > self.max_bytes {
            return Err(Error::PayloadTooLarge);
        }

        let ext = sniff_magic(&decoded)
            .ok_or_else(|| Error::Validation("image bytes do not match a supported format".into()))?;

        if let Some(mime) = declared_mime {
            if !mime_matches_ext(mime, ext) {
                return Err(Error::Validation(format!(
                    "declared type {mime} does not match image bytes ({ext})"
                )));
            }
        }

        let dir = self.uploads_dir.join(id.as_str());
        std::fs::create_dir_all(&dir)?;

        let filename = format!(
            "{}-{}.{ext}",
            chrono::Utc::now().timestamp_millis(),
            rand_suffix()
        );
        std::fs::write(dir.join(&filename), &decoded)?;

        TraceEvent::ImageStored {
            conversation_id: id.as_str().to_string(),
            bytes: decoded.len(),
            ext: ext.to_string(),
        }
        .emit();

        Ok(StoredImage {
            url_path: format!("/images/{}/{}", id.as_str(), filename),
            filename,
            bytes: decoded.len(),
            ext,
        })
    }

    /// Resolve a served file, refusing names that could escape the tree.
    pub fn resolve(&self, id: &str, file: &str) -> Result<PathBuf> {
        if !ConversationId::is_valid(id) {
            return Err(Error::Validation(format!("invalid conversation id: {id:?}")));
        }
        if file.is_empty()
            || file
                .chars()
                .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '.'))
            || file.contains("..")
        {
            return Err(Error::Validation(format!("invalid file name: {file:?}")));
        }
        let path = self.uploads_dir.join(id).join(file);
        if !path.is_file() {
            return Err(Error::NotFound(format!("image {id}/{file}")));
        }
        Ok(path)
    }
}

/// Split a `data:image/<type>;base64,<body>` URL into (declared type, body).
/// A bare base64 payload comes back as `(None, payload)`.
fn split_data_url(payload: &str) -> (Option<&str>, &str) {
    let Some(rest) = payload.strip_prefix("data:image/") else {
        return (None, payload);
    };
    match rest.split_once(";base64,") {
        Some((mime, body)) => (Some(mime), body),
        None => (None, payload),
    }
}

/// Identify the format from the decoded bytes.
fn sniff_magic(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("png")
    } else if bytes.starts_with(&[0x47, 0x49, 0x46, 0x38]) {
        Some("gif")
    } else if bytes.starts_with(&[0x52, 0x49, 0x46, 0x46]) {
        Some("webp")
    } else {
        None
    }
}

fn mime_matches_ext(mime: &str, ext: &str) -> bool {
    match ext {
        "jpg" => mime == "jpeg" || mime == "jpg",
        other => mime == other,
    }
}

fn rand_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| {
            let n: u8 = rng.gen_range(0..36);
            if n < 10 {
                (b'0' + n) as char
            } else {
                (b'a' + n - 10) as char
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intake(dir: &Path) -> ImageIntake {
        ImageIntake::new(dir, 1024 * 1024).unwrap()
    }

    fn id() -> ConversationId {
        "AB1234".parse().unwrap()
    }

    fn png_bytes() -> Vec<u8> {
        let mut b = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        b.extend_from_slice(&[0u8; 32]);
        b
    }

    #[test]
    fn accepts_png_data_url() {
        let dir = tempfile::tempdir().unwrap();
        let payload = format!("data:image/png;base64,{}", STANDARD.encode(png_bytes()));
        let stored = intake(dir.path()).store(&id(), &payload).unwrap();
        assert_eq!(stored.ext, "png");
        assert!(stored.url_path.starts_with("/images/AB1234/"));
        assert!(dir.path().join("AB1234").join(&stored.filename).is_file());
    }

    #[test]
    fn accepts_raw_base64_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.extend_from_slice(&[0u8; 16]);
        let stored = intake(dir.path())
            .store(&id(), &STANDARD.encode(&bytes))
            .unwrap();
        assert_eq!(stored.ext, "jpg");
    }

    #[test]
    fn rejects_unknown_magic() {
        let dir = tempfile::tempdir().unwrap();
        let payload = STANDARD.encode(b"MZ\x90\x00 definitely not an image");
        match intake(dir.path()).store(&id(), &payload) {
            Err(Error::Validation(_)) => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_mime_magic_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let payload = format!("data:image/gif;base64,{}", STANDARD.encode(png_bytes()));
        assert!(matches!(
            intake(dir.path()).store(&id(), &payload),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn rejects_disallowed_mime() {
        let dir = tempfile::tempdir().unwrap();
        let payload = format!("data:image/svg+xml;base64,{}", STANDARD.encode(b"<svg/>"));
        assert!(matches!(
            intake(dir.path()).store(&id(), &payload),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn rejects_oversize_payload() {
        let dir = tempfile::tempdir().unwrap();
        let intake = ImageIntake::new(dir.path(), 16).unwrap();
        let payload = STANDARD.encode(png_bytes());
        assert!(matches!(
            intake.store(&id(), &payload),
            Err(Error::PayloadTooLarge)
        ));
    }

    #[test]
    fn resolve_refuses_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let intake = intake(dir.path());
        assert!(matches!(
            intake.resolve("AB1234", "../secret"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            intake.resolve("../up", "file.png"),
            Err(Error::Validation(_))
        ));
    }
}
