pub mod forecast;
pub mod handler;
pub mod memory;
pub mod weather;
