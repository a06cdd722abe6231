pub mod job;
pub mod location;
pub mod technician;
