pub mod api;
pub mod listings;
