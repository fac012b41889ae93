#![allow(clippy::collapsible_if)]

use std::collections::HashSet;

use http::{HeaderName, HeaderValue, Method};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    config::models::{FragmentDefinition, FragmentKind, RouteDefinition, ServerConfig},
    core::registry::normalize_path,
};

static HOSTNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?)*(:[0-9]{1,5})?$")
        .unwrap_or_else(|e| unreachable!("hostname pattern is valid: {e}"))
});

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Route conflict detected: {message}")]
    RouteConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration, reporting every problem found.
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let errors = Self::collect_errors(config);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Every problem in the configuration, in the order found.
    pub fn collect_errors(config: &ServerConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if config.socket_addr().is_err() {
            errors.push(ValidationError::InvalidListenAddress {
                address: config.listen_addr.clone(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }

        if config.environment.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "environment".to_string(),
            });
        }

        if let Err(e) = Self::validate_url(&config.default_backend_url, "default_backend_url") {
            errors.push(e);
        }

        for (name, value) in &config.common_response_headers {
            if let Err(e) = Self::validate_header(name, value, "common_response_headers") {
                errors.push(e);
            }
        }

        errors.extend(Self::validate_proxy(config));

        for route in &config.routes {
            errors.extend(Self::validate_route(route));
        }

        if let Err(conflicts) = Self::check_route_conflicts(&config.routes) {
            errors.extend(conflicts);
        }

        errors
    }

    fn validate_proxy(config: &ServerConfig) -> Vec<ValidationError> {
        let proxy = &config.proxy;
        let mut errors = Vec::new();

        if !proxy.base_path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: "proxy.base_path".to_string(),
                message: "Base path must start with '/'".to_string(),
            });
        }

        if proxy.timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "proxy.timeout_secs".to_string(),
                message: "Proxy timeout must be greater than 0".to_string(),
            });
        }

        if let Some(host) = &proxy.host_rewrite {
            if let Err(e) = Self::validate_host(host) {
                errors.push(e);
            }
        }

        for (field, prefix) in [
            ("proxy.path_rewrite.strip_prefix", &proxy.path_rewrite.strip_prefix),
            ("proxy.path_rewrite.add_prefix", &proxy.path_rewrite.add_prefix),
        ] {
            if let Some(prefix) = prefix {
                if !prefix.starts_with('/') {
                    errors.push(ValidationError::InvalidField {
                        field: field.to_string(),
                        message: format!("Prefix '{prefix}' must start with '/'"),
                    });
                }
            }
        }

        errors
    }

    fn validate_route(route: &RouteDefinition) -> Vec<ValidationError> {
        let path = &route.path;
        let mut errors = Vec::new();

        if !path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("route path: {path}"),
                message: "Route paths must start with '/'".to_string(),
            });
        }

        if let Err(e) = Self::validate_method(&route.method, &format!("route '{path}' method")) {
            errors.push(e);
        }

        if let Some(status) = route.redirect_status {
            if route.redirect.is_none() {
                errors.push(ValidationError::MissingField {
                    field: format!("route '{path}' redirect"),
                });
            }
            if !Self::is_valid_redirect_status_code(status) {
                errors.push(ValidationError::InvalidField {
                    field: format!("route '{path}' redirect_status"),
                    message: format!(
                        "Status code {status} is not a valid redirect code. Use 301, 302, 303, 307, or 308"
                    ),
                });
            }
        }

        if let Some(location) = &route.redirect {
            if HeaderValue::from_str(location).is_err() || location.is_empty() {
                errors.push(ValidationError::InvalidField {
                    field: format!("route '{path}' redirect"),
                    message: format!("'{location}' is not a valid Location value"),
                });
            }
        }

        for (name, value) in &route.response_headers {
            if let Err(e) =
                Self::validate_header(name, value, &format!("route '{path}' response_headers"))
            {
                errors.push(e);
            }
        }

        if route.redirect.is_none() && route.fragments.is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("route '{path}' fragments"),
            });
        }

        let mut names = HashSet::new();
        for fragment in &route.fragments {
            if !names.insert(fragment.name.as_str()) {
                errors.push(ValidationError::InvalidField {
                    field: format!("route '{path}' fragments"),
                    message: format!("Fragment '{}' is defined more than once", fragment.name),
                });
            }
            errors.extend(Self::validate_fragment(path, fragment));
        }

        if let Some(template) = &route.template {
            if !names.contains(template.as_str()) {
                errors.push(ValidationError::InvalidField {
                    field: format!("route '{path}' template"),
                    message: format!("Template fragment '{template}' is not defined"),
                });
            }
        }

        errors
    }

    fn validate_fragment(path: &str, fragment: &FragmentDefinition) -> Vec<ValidationError> {
        let context = format!("route '{path}' fragment '{}'", fragment.name);
        let mut errors = Vec::new();

        if fragment.name.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("route '{path}' fragment name"),
            });
        }

        match fragment.kind {
            FragmentKind::Local => {
                if fragment.data.is_none() {
                    errors.push(ValidationError::MissingField {
                        field: format!("{context} data"),
                    });
                }
            }
            FragmentKind::File => {
                if fragment.path.as_deref().is_none_or(str::is_empty) {
                    errors.push(ValidationError::MissingField {
                        field: format!("{context} path"),
                    });
                }
            }
            FragmentKind::Remote => {
                match fragment.url.as_deref() {
                    None | Some("") => errors.push(ValidationError::MissingField {
                        field: format!("{context} url"),
                    }),
                    Some(url) if is_absolute(url) => {
                        if let Err(e) = Self::validate_url(&strip_placeholders(url), &context) {
                            errors.push(e);
                        }
                    }
                    Some(_) => {}
                }
                if let Some(base) = &fragment.base {
                    if let Err(e) = Self::validate_url(base, &format!("{context} base")) {
                        errors.push(e);
                    }
                }
                if let Some(method) = &fragment.method {
                    if let Err(e) = Self::validate_method(method, &format!("{context} method")) {
                        errors.push(e);
                    }
                }
                for name in fragment.headers.keys() {
                    if HeaderName::from_bytes(name.as_bytes()).is_err() {
                        errors.push(ValidationError::InvalidField {
                            field: format!("{context} headers"),
                            message: format!("Invalid header name '{name}'"),
                        });
                    }
                }
            }
        }

        errors
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn validate_method(method: &str, context: &str) -> ValidationResult<()> {
        Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map(|_| ())
            .map_err(|_| ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("'{method}' is not an HTTP method"),
            })
    }

    fn validate_header(name: &str, value: &str, context: &str) -> ValidationResult<()> {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid header name '{name}'"),
            });
        }
        if HeaderValue::from_str(value).is_err() {
            return Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid value for header '{name}'"),
            });
        }
        Ok(())
    }

    /// Detect method+path pairs that would be registered twice.
    fn check_route_conflicts(routes: &[RouteDefinition]) -> Result<(), Vec<ValidationError>> {
        let mut seen = HashSet::new();
        let mut errors = Vec::new();

        for route in routes {
            let key = (
                route.method.to_ascii_uppercase(),
                normalize_path(&route.path),
            );
            if !seen.insert(key) {
                errors.push(ValidationError::RouteConflict {
                    message: format!("{} {} is defined more than once", route.method, route.path),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn is_valid_redirect_status_code(code: u16) -> bool {
        matches!(code, 301 | 302 | 303 | 307 | 308)
    }

    /// Validate host field format
    fn validate_host(host: &str) -> ValidationResult<()> {
        if host.is_empty() {
            return Err(ValidationError::InvalidField {
                field: "proxy.host_rewrite".to_string(),
                message: "Host cannot be empty".to_string(),
            });
        }

        if host.contains("://") {
            return Err(ValidationError::InvalidField {
                field: "proxy.host_rewrite".to_string(),
                message: "Host should not contain protocol (e.g., use 'example.com' not 'http://example.com')".to_string(),
            });
        }

        if !HOSTNAME.is_match(host) {
            return Err(ValidationError::InvalidField {
                field: "proxy.host_rewrite".to_string(),
                message: format!("Invalid hostname format: '{host}'"),
            });
        }

        Ok(())
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Replace `{name}` placeholders so a URL template can be parsed.
fn strip_placeholders(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut in_placeholder = false;
    for c in template.chars() {
        match c {
            '{' => {
                in_placeholder = true;
                out.push('x');
            }
            '}' if in_placeholder => in_placeholder = false,
            _ if in_placeholder => {}
            _ => out.push(c),
        }
    }
    out
}
