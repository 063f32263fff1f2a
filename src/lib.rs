pub mod nameserver;
pub mod resolver;
pub mod shared;
