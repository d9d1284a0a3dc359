pub mod cost;
pub mod window;

pub use cost::{estimate_cost, to_minor_units, CostEstimator, Tariff};
pub use window::{service_window, ServiceWindow};
