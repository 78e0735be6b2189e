//! MIME classification for rendition substitutes

/// Returns true if content of this type is previewed through a server rendition
///
/// Office document families have no native viewer, so their PDF or image
/// rendition is downloaded alongside the content.
pub fn needs_rendition(mime_type: &str) -> bool {
    let mime = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    mime == "application/msword"
        || mime == "application/rtf"
        || mime == "text/rtf"
        || mime.starts_with("application/vnd.ms-")
        || mime.starts_with("application/vnd.openxmlformats-officedocument.")
        || mime.starts_with("application/vnd.oasis.opendocument.")
}
