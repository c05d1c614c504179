//! Persistent run state: watermark and seen-ID stores.
//!
//! Both stores share the same contract: `load` fails soft, returning
//! empty state when the backing file is missing or unreadable, and
//! `save` is a full atomic overwrite (temp file + rename). The pipeline
//! favors reprocessing over losing data, so a corrupt store is a warning
//! and a cold start, never a fatal error.
//!
//! State is only saved after the corresponding sink write succeeds; a
//! run killed mid-way leaves the previous state intact and the next run
//! safely reprocesses.

mod seen;
mod watermark;

pub use seen::SeenIdStore;
pub use watermark::WatermarkStore;
