pub mod handlers;
#[cfg(test)]
pub mod memory;
pub mod reconcile;
pub mod resolver;
pub mod service;
pub mod store;
pub mod translate;
