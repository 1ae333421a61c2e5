pub mod cost;
pub mod deploy;
pub mod diagnose;
pub mod objects;
pub mod status;
pub mod teardown;
pub mod whoami;
