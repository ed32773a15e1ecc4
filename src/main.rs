#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate tracing;

mod app;
mod bench;
mod cli;
mod config;
mod error;
mod http;
mod response;
mod timing;
mod tls;

use crate::app::run::main_with_error;

#[tokio::main]
async fn main() {
    if let Err(e) = main_with_error().await {
        eprintln!("latbench: {:#}", e);
        std::process::exit(1);
    }
}
