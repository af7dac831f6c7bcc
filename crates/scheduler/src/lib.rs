pub mod directory;
pub mod dispatcher;
pub mod lease;
pub mod resolver;
pub mod service;
pub mod store;
