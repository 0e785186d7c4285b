pub mod handlers;
pub mod ws;
