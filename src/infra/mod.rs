pub mod db;
pub mod devices;
pub mod gateway;
pub mod store;
