mod back_end;
pub mod conf;
mod handler;

pub use back_end::*;
pub use handler::ResolverHandler;
