pub mod debug_log;
pub mod error;
pub mod logger;
pub mod validation;
