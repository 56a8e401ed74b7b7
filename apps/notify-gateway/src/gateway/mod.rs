pub mod dispatcher;
pub mod events;
pub mod handle;
pub mod lifecycle;
pub mod payload;
pub mod registry;
pub mod server;
