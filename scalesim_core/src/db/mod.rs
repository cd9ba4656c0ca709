pub mod container;
pub mod loadtest;
pub mod scaling;
pub mod user;
