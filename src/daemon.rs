pub mod publisher;
pub mod server;
pub mod subscriber;
pub mod tracker;
