mod keys;
mod time;

pub use keys::image_object_key;
pub use time::{format_local, now_local};
