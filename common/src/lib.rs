pub mod file_format;
pub mod log_setup;

pub use file_format::{read_file, write_file, FileFormatError, FileFormatResult, SerdeFormat};
pub use log_setup::setup_logging;

pub const EPSILON: f64 = 1e-10;
