pub mod config;
pub mod error;
pub mod logging;
pub mod modem;
pub mod serial;
pub mod shutdown;
pub mod supervisor;
pub mod telemetry;

pub use logging::{
    crash_log_path, init_logging, install_panic_hook, log_debug, log_debug_content,
    log_file_path,
};
