pub mod codec;
pub mod merge;
pub mod record;
pub mod source;

pub use merge::MergeResult;
pub use record::{Record, RecordError};
