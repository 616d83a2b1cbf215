pub mod index;
pub mod models;
pub mod reconciler;
pub mod resolver;
pub mod source_reader;
pub mod stats;
