// # Cyclocity Sources
//
// This crate provides the network-facing collaborators of a poll for
// JCDecaux/Cyclocity bike-share networks:
//
// - **OpenDataDirectory**: station list from an open-data JSON export
// - **CyclocityInventory**: per-station bike inventory from the bikes API
// - **StaticCredential** / **CommandCredential**: the API authorization value
//
// ## Error Mapping
//
// Sources perform a single request per call and never retry. They classify
// failures so the fetcher's retry policy can act on them:
//
// | Failure                      | Error                         | Retried |
// |------------------------------|-------------------------------|---------|
// | timeout                      | `Error::Timeout`              | yes     |
// | connect/reset/body           | `Error::Transport`            | yes     |
// | HTTP 5xx, 429                | `Error::HttpStatus`           | yes     |
// | HTTP 401, 403                | `Error::Authentication`       | no      |
// | other HTTP 4xx               | `Error::HttpStatus`           | no      |
// | invalid JSON                 | `Error::Inventory`/`Directory`| no      |

pub mod credential;
pub mod directory;
pub mod inventory;

pub use credential::{CommandCredential, CommandCredentialFactory, StaticCredential, StaticCredentialFactory};
pub use directory::{OpenDataDirectory, OpenDataDirectoryFactory};
pub use inventory::{CyclocityInventory, CyclocityInventoryFactory};

use velo_core::Error;
use velo_core::registry::SourceRegistry;

/// Register every source of this crate with a registry
///
/// # Example
///
/// ```rust
/// use velo_core::SourceRegistry;
///
/// let registry = SourceRegistry::with_builtins();
/// velo_source_cyclocity::register(&registry);
/// assert!(registry.has_inventory_source("cyclocity"));
/// ```
pub fn register(registry: &SourceRegistry) {
    registry.register_directory("open_data", Box::new(OpenDataDirectoryFactory));
    registry.register_inventory_source("cyclocity", Box::new(CyclocityInventoryFactory));
    registry.register_credential_provider("static", Box::new(StaticCredentialFactory));
    registry.register_credential_provider("command", Box::new(CommandCredentialFactory));
}

/// Map a non-success HTTP status to an error
pub(crate) fn status_error(status: reqwest::StatusCode, context: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!("{} rejected the credential ({})", context, status)),
        code => Error::http_status(code, context.to_string()),
    }
}

/// Map a reqwest failure to a transient or permanent error
pub(crate) fn request_error(err: reqwest::Error, context: &str) -> Error {
    if err.is_timeout() {
        Error::timeout(format!("{}: {}", context, err))
    } else if err.is_builder() {
        Error::invalid_input(format!("{}: {}", context, err))
    } else if let Some(status) = err.status() {
        status_error(status, context)
    } else {
        Error::transport(format!("{}: {}", context, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_register_all_sources() {
        let registry = SourceRegistry::new();
        register(&registry);

        assert!(registry.has_directory("open_data"));
        assert!(registry.has_inventory_source("cyclocity"));
        assert!(registry.has_credential_provider("static"));
        assert!(registry.has_credential_provider("command"));
    }

    #[test]
    fn test_status_mapping() {
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, "bikes").is_transient());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "bikes").is_transient());
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "bikes"),
            Error::Authentication(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "bikes"),
            Error::Authentication(_)
        ));

        let not_found = status_error(StatusCode::NOT_FOUND, "bikes");
        assert!(!not_found.is_transient());
        assert!(matches!(not_found, Error::HttpStatus { status: 404, .. }));
    }
}
