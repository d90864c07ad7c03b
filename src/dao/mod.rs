/// Plugin-status seam consulted before persisting.
pub mod plugins;
/// Per-instance save artifacts on disk.
pub mod save_files;
/// Atomic read/write of the session state snapshot.
pub mod state_file;
/// Storage error type shared by the on-disk backends.
pub mod storage;
