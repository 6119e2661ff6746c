pub mod classify;
pub mod db;
pub mod gradebook;
pub mod ipc;
pub mod roster;
pub mod scale;
pub mod scorer;
pub mod settings;
pub mod stats;
pub mod store;
pub mod submission;
pub mod trend;
