//! CLI command handlers

pub mod commands;

pub use commands::{
    aggregate_sheet, load_records, sheets, update, variance, RecordSource, RollupOptions,
};
