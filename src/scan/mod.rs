//! Bulk restore: walks directory trees, resolves keys and decrypts files.

mod engine;
mod options;
mod resolver;

pub use engine::{scan, ProgressCallback, ScanProgress, Scanner};
pub use options::ScanOptions;
pub use resolver::{KeyResolver, Resolution};
