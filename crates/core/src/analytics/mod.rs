pub mod aggregate;
pub mod anomaly;
pub mod campaign;
pub mod entities;
pub mod forecast;
pub mod ratios;
pub mod rules;
pub mod storefront;
pub mod trend;
