pub mod file_system;
pub mod http_client;
pub mod http_handler;
pub mod renderer;

/// Re-export commonly used types from adapters
pub use file_system::FileSystemAdapter;
pub use http_client::HttpClientAdapter;
pub use http_handler::{ErrorPage, HttpHandler, router};
pub use renderer::TemplateRenderer;
