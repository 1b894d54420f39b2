mod client_context_extractor;
mod validation_extractor;

pub use client_context_extractor::*;
pub use validation_extractor::*;
