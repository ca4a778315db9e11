pub mod classifier;
pub mod dispatch;
