//! Terminal progress display

pub mod reporter;
