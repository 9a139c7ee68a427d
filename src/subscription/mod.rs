// Connection registry and per-socket event pumping

pub mod hub;
pub mod manager;

pub use hub::{Connection, Hub};
pub use manager::ConnectionManager;
