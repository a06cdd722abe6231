pub mod agent;
pub mod api;
pub mod geolocation;
pub mod job_board;
pub mod lifecycle;
pub mod position;
pub mod session;
pub mod vault;

#[cfg(test)]
pub(crate) mod test_support;
