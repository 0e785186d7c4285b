pub mod signature;
pub mod slack;
