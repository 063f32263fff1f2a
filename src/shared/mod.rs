pub mod buffer;
pub mod dns;
pub mod logs;
pub mod net;
pub mod thread_pool;
