//! Regression models: CART trees, the bagged forest and the OLS fallback

pub mod forest;
pub mod linear;
pub mod tree;

pub use forest::{ForestParams, MaxFeatures, RandomForestRegressor};
pub use linear::LinearRegression;
pub use tree::{RegressionTree, TreeParams};
