pub mod auth;
pub mod client;
pub mod mapper;

pub use auth::GitHubAuth;
pub use client::GitHubHost;
