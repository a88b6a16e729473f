pub mod annotate;
pub mod common;
pub mod config;
pub mod delete;
pub mod list;
pub mod note;
pub mod record;
pub mod sync;
