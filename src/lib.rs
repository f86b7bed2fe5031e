pub mod clock;
pub mod config;
pub mod credentials;
pub mod download;
pub mod duration;
pub mod merge;
pub mod orchestrator;
pub mod period;
pub mod portal;
pub mod table;
