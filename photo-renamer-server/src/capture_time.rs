use chrono::{DateTime, Local, NaiveDateTime};
use exif::{In, Reader, Tag, Value};
use std::io::Cursor;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed EXIF date-time layout.
const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Tags consulted in priority order: original capture, then last modification.
const DATE_TAGS: [Tag; 2] = [Tag::DateTimeOriginal, Tag::DateTime];

/// Anything that can pull an embedded capture time out of raw image bytes.
pub trait CaptureTimeReader: Send + Sync {
    fn read_capture_timestamp(&self, bytes: &[u8]) -> Option<NaiveDateTime>;
}

/// Reads the capture time from the image's EXIF container.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifCaptureTime;

impl CaptureTimeReader for ExifCaptureTime {
    fn read_capture_timestamp(&self, bytes: &[u8]) -> Option<NaiveDateTime> {
        let exif = match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "no readable exif container");
                return None;
            }
        };
        for tag in DATE_TAGS {
            let Some(field) = exif.get_field(tag, In::PRIMARY) else {
                continue;
            };
            if let Some(dt) = ascii_datetime(&field.value) {
                return Some(dt);
            }
            tracing::debug!(%tag, value = %field.display_value(), "unparseable exif date");
        }
        None
    }
}

fn ascii_datetime(value: &Value) -> Option<NaiveDateTime> {
    let Value::Ascii(parts) = value else {
        return None;
    };
    let raw = std::str::from_utf8(parts.first()?).ok()?;
    let cleaned = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    NaiveDateTime::parse_from_str(cleaned, EXIF_DATETIME_FORMAT).ok()
}

/// Capture time for an image. Never fails: falls back to `modified`, then to now.
pub fn extract(
    reader: &dyn CaptureTimeReader,
    bytes: &[u8],
    modified: Option<SystemTime>,
) -> NaiveDateTime {
    if let Some(dt) = reader.read_capture_timestamp(bytes) {
        return dt;
    }
    match modified.filter(|t| *t > UNIX_EPOCH) {
        Some(t) => DateTime::<Local>::from(t).naive_local(),
        None => Local::now().naive_local(),
    }
}
