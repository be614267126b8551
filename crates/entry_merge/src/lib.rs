//! Incremental entry reconstruction for streamed search answers.
//!
//! The server streams partial [`Entry`] documents. Each one is merged into the
//! running document with [`merge`], and [`StreamAccumulator`] turns the merged
//! document into answer text, a delta since the previous update, and source
//! links. Nothing here performs I/O.

pub mod accumulator;
pub mod entry;
pub mod merge;
pub mod patch;

pub use accumulator::{compute_delta, extract_answer, extract_sources, StreamAccumulator, StreamUpdate};
pub use entry::{
    Block, BlockPayload, Entry, EntryStatus, MarkdownBlock, MarkdownProgress, PatchBlock,
    SourceLink, WebResult, WebResultsBlock,
};
pub use merge::{merge, merge_with_diagnostics, MergeOutcome, PatchFailure};
pub use patch::{apply_patch, PatchError, PatchOperation};
