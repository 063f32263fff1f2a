pub mod conf;
mod handler;
mod zones;

pub use handler::NameserverHandler;
pub use zones::*;
