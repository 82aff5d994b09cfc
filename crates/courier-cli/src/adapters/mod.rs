//! Reference adapters wired into the engine by the CLI: plain HTTP
//! extraction and filesystem delivery.

mod dir_delivery;
mod http_fetch;

pub use dir_delivery::DirDelivery;
pub use http_fetch::HttpExtractor;
