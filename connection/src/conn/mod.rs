pub mod connection_options;
pub mod http_channel;
pub mod pool;
pub mod ssl_options;
pub mod client;
