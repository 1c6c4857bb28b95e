pub mod format;
pub mod remotes;
pub mod repo;
pub mod show;
pub mod sync;
pub mod versions;
