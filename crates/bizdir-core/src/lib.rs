//! Core bizdir library (backend client, auth callback completion, navigation).

pub mod backend;
pub mod callback;
pub mod config;
pub mod links;
pub mod logging;
pub mod media;
pub mod navigation;
pub mod oauth;
pub mod profile;
pub mod redirect;
pub mod session;
