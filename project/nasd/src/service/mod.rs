pub mod archive;
pub mod backup;
pub mod file;
pub mod index;
pub mod lifecycle;
pub mod mirror;
pub mod reclaim;
pub mod scheduler;
