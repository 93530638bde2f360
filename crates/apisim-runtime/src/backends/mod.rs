//! Storage backends for the collaborator traits in `crate::repository`.

mod file;
mod inmemory;
mod log_sink;

pub use file::FileRepository;
pub use inmemory::InMemoryRepository;
pub use log_sink::{MemoryLogSink, TracingLogSink};
