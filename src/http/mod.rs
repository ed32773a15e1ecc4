pub mod probe;
pub mod timing_connector;
pub mod timing_resolver;
