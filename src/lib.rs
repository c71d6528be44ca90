pub mod config;
pub mod decode;
pub mod error;
pub mod layout;
pub mod record;
pub mod warehouse;
