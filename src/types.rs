mod api;
mod data_url;

pub use api::*;
pub use data_url::*;
