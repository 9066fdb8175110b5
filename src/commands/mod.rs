pub mod preview_api;
pub mod util_api;
