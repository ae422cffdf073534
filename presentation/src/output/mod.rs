//! Run report formatting

pub mod console;
