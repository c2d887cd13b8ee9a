pub mod event_repo;
pub mod session_repo;
pub mod stats_repo;
pub mod user_repo;
pub mod volunteer_repo;
