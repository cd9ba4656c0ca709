pub mod billing_snapshots;
pub mod containers;
pub mod load_test_metrics;
pub mod load_tests;
pub mod pricing_models;
pub mod resource_usage;
pub mod scaling_events;
pub mod scaling_policies;
pub mod users;

pub mod prelude {
    pub use super::billing_snapshots::Entity as BillingSnapshots;
    pub use super::containers::Entity as Containers;
    pub use super::load_test_metrics::Entity as LoadTestMetrics;
    pub use super::load_tests::Entity as LoadTests;
    pub use super::pricing_models::Entity as PricingModels;
    pub use super::resource_usage::Entity as ResourceUsage;
    pub use super::scaling_events::Entity as ScalingEvents;
    pub use super::scaling_policies::Entity as ScalingPolicies;
    pub use super::users::Entity as Users;
}
