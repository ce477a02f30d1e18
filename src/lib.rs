pub mod api;
pub mod config;
pub mod http_client;
pub mod registry_client;
pub mod services;
pub mod wifi_driver;
