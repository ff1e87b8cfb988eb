//! File signature (magic number) verification.
//!
//! Checks the leading bytes of an upload against the known signature for the
//! declared MIME type, independent of the claimed extension. A mismatch is
//! treated as a forgery signal and fails security validation.

/// Verify that `head` plausibly starts a file of `declared_mime`.
///
/// MIME types without a reliable signature (plain text) pass unchecked; the
/// MIME allow-list has already run by the time this is called.
pub fn verify_signature(declared_mime: &str, head: &[u8]) -> Result<(), String> {
    let mime = declared_mime
        .split(';')
        .next()
        .map(|s| s.trim())
        .unwrap_or(declared_mime)
        .to_lowercase();

    let matches = match mime.as_str() {
        "image/jpeg" => head.len() >= 3 && head[0..3] == [0xFF, 0xD8, 0xFF],
        "image/png" => {
            head.len() >= 8 && head[0..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]
        }
        "image/gif" => {
            head.len() >= 6 && (&head[0..6] == b"GIF87a" || &head[0..6] == b"GIF89a")
        }
        "image/webp" => head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WEBP",
        "image/bmp" => head.len() >= 2 && &head[0..2] == b"BM",
        "image/tiff" => {
            head.len() >= 4
                && (head[0..4] == [0x49, 0x49, 0x2A, 0x00] || head[0..4] == [0x4D, 0x4D, 0x00, 0x2A])
        }
        "application/pdf" => head.len() >= 4 && &head[0..4] == b"%PDF",
        // OOXML formats are ZIP containers
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
            head.len() >= 4 && head[0..4] == [0x50, 0x4B, 0x03, 0x04]
        }
        // Legacy Office formats use the OLE compound document header
        "application/msword" | "application/vnd.ms-excel" => {
            head.len() >= 8
                && head[0..8] == [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]
        }
        _ => {
            tracing::debug!(
                mime = %mime,
                "No known signature for MIME type, skipping verification"
            );
            return Ok(());
        }
    };

    if matches {
        Ok(())
    } else {
        Err(format!(
            "File content does not match declared type '{}'",
            declared_mime
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_signature() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        assert!(verify_signature("image/jpeg", &jpeg).is_ok());
        assert!(verify_signature("image/jpeg; charset=binary", &jpeg).is_ok());
    }

    #[test]
    fn test_png_signature() {
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
        assert!(verify_signature("image/png", &png).is_ok());
    }

    #[test]
    fn test_pdf_signature() {
        assert!(verify_signature("application/pdf", b"%PDF-1.4\n").is_ok());
        assert!(verify_signature("application/pdf", b"not a pdf").is_err());
    }

    #[test]
    fn test_mismatch_is_rejected() {
        // PNG bytes declared as JPEG: forgery signal
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        let err = verify_signature("image/jpeg", &png).unwrap_err();
        assert!(err.contains("does not match"));
    }

    #[test]
    fn test_truncated_head_is_rejected() {
        assert!(verify_signature("image/png", &[0x89, 0x50]).is_err());
        assert!(verify_signature("image/webp", b"RIFF").is_err());
    }

    #[test]
    fn test_unknown_mime_passes() {
        assert!(verify_signature("text/plain", b"hello world").is_ok());
    }

    #[test]
    fn test_office_signatures() {
        let zip = [0x50, 0x4B, 0x03, 0x04, 0x14, 0x00];
        assert!(verify_signature(
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            &zip
        )
        .is_ok());

        let ole = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        assert!(verify_signature("application/msword", &ole).is_ok());
        assert!(verify_signature("application/msword", &zip).is_err());
    }
}
