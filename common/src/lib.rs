pub mod aggregate;
pub mod bench;
pub mod config;
pub mod record;
pub mod util;
