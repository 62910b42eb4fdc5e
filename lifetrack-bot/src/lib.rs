pub mod channels;
pub mod config;
pub mod graphql;
pub mod nl;
pub mod notifications;
pub mod sessions;
pub mod ui;
