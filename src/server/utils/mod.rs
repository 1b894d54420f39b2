pub mod cache_utils;
pub mod hls_utils;
pub mod media_utils;
pub mod subtitle_utils;
pub mod translate_utils;
