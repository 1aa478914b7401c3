//! Metadata writer (spec.md §4.7): safe, atomic tag edits applied to a
//! Track's source file through the same external-subprocess pattern the
//! Probe and Analysis pipeline use for inspect/decode.

mod bulk;
mod writer;

pub use bulk::{fix_track_numbering, normalize_album_artist, set_field, BulkOutcome};
pub use writer::{
    MetadataWriter, MuxRunner, ProcessMuxRunner, TagChanges, WritePreview, WriteResult,
};
