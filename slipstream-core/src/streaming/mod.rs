//! Range-aware progressive delivery primitives.

pub mod range;
pub mod source;

pub use range::{RangeError, RangeRequest, RangeSpec, format_dlna_duration, parse_range};
pub use source::SourceStream;
