mod not_found;

pub use not_found::not_found_handler;
pub(crate) use not_found::not_found_response;
