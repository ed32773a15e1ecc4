pub mod any_server_cert;
pub mod client_config;

pub use client_config::build_client_config;
