pub mod config;
pub mod controller;

pub use config::{Mailrelay, find_config_file};
pub use controller::{Controller, Processed};
