use crate::util::{format_local, now_local};
use uuid::Uuid;

const IMAGE_KEY_PREFIX: &str = "images";
const IMAGE_KEY_EXTENSION: &str = "jpg";
const TIMESTAMP_PATTERN: &str = "%Y%m%d_%H%M%S";

/// Object key for an uploaded listing photo.
///
/// A v4 UUID keeps keys unique under concurrent uploads; the second-resolution
/// timestamp only makes bucket listings readable.
pub fn image_object_key() -> String {
    let timestamp = format_local(&now_local(), TIMESTAMP_PATTERN);
    format!(
        "{}/{}_{}.{}",
        IMAGE_KEY_PREFIX,
        Uuid::new_v4(),
        timestamp,
        IMAGE_KEY_EXTENSION
    )
}
