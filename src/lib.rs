// Otto wheel robot runtime: motion engine, action queue and zenoh bridge
pub mod config;
pub mod controller;
pub mod messages;
pub mod motion;
pub mod runtime;
pub mod trims;
