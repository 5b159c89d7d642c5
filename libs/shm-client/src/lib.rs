pub mod account;
pub mod api;
pub mod auth;
pub mod category;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod models;
pub mod notify;
pub mod ordering;
pub mod owned;
pub mod partner;
pub mod session;
pub mod state;
pub mod store;
pub mod widget;

pub use error::{Result, ShmError};

#[cfg(test)]
pub(crate) mod testing;
