pub mod stats;

pub use stats::{ChartPoint, DashboardStats};
