pub mod auth;
pub mod heartbeat;
pub mod jobs;
pub mod observe;
