pub mod auth;
pub mod autoscaling;
pub mod billing;
pub mod containers;
pub mod loadtest;
pub mod monitoring;
