pub mod api;
pub mod canvas;
pub mod config;
pub mod editor;
pub mod state;
#[cfg(test)]
pub(crate) mod test_support;
pub mod types;
pub mod util;
