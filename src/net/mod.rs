pub mod handlers;
pub mod opcodes;
pub mod packet;
pub mod server;
pub mod session;
pub mod status;
