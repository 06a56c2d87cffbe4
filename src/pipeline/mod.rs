pub mod blend;
pub mod concat;
pub mod orchestrator;
pub mod reader;
pub mod storage;

/// Raw source exports are UTF-8; concatenated intermediates and every
/// delimited output use the archival single-byte encoding.
pub use encoding_rs::{UTF_8 as SOURCE_ENCODING, WINDOWS_1252 as ARCHIVE_ENCODING};
pub use orchestrator::{Orchestrator, RunPhase, RunResult};
pub use storage::StoragePaths;
