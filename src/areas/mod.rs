//! Storage areas used during a single export run
//!
//! This module contains the two pieces of run-scoped storage the export
//! engine leans on:
//!
//! - `mark_table`: serial and mark counters plus the serial-to-mark map
//! - `blob_store`: content spill area on local disk for canonical mode
//!
//! Both live exactly as long as one export; nothing in here survives the
//! run.

pub mod blob_store;
pub mod mark_table;
