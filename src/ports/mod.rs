pub mod file_system;
pub mod http_client;
pub mod renderer;
