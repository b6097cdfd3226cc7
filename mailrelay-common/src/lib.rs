pub mod logging;

pub use tracing;
