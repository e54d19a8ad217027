//! Gateway errors.
use async_graphql::ErrorExtensionValues;
use async_graphql::ErrorExtensions;
use async_graphql::Value;
use displaydoc::Display;
use thiserror::Error;

pub use crate::configuration::ConfigurationError;
use crate::graphql;

/// Error types for forwarding an operation to the upstream.
///
/// These are not returned to the client as is, but are converted to GraphQL errors with
/// [`ErrorExtensions::extend`].
#[derive(Error, Display, Debug, Clone, PartialEq)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum FetchError {
    /// request was malformed: {reason}
    MalformedRequest {
        /// The reason the request could not be built.
        reason: String,
    },

    /// HTTP fetch failed from '{service}': {reason}
    ///
    /// note that this relates to a transport error and not a GraphQL error
    SubrequestHttpError {
        /// The HTTP status, when a response was received at all.
        status_code: Option<u16>,

        /// The service that failed.
        service: String,

        /// The reason the fetch failed.
        reason: String,
    },

    /// service '{service}' response was malformed: {reason}
    SubrequestMalformedResponse {
        /// The service that responded with the malformed response.
        service: String,

        /// The reason the deserialization failed.
        reason: String,
    },

    /// service '{service}' returned errors for '{operation}': {reason}
    SubrequestGraphQLErrors {
        /// The service that returned the errors.
        service: String,

        /// The operation whose field could not be resolved.
        operation: String,

        /// The upstream error messages, joined.
        reason: String,

        /// The upstream errors.
        errors: Vec<graphql::Error>,
    },

    /// service '{service}' response has no 'data.{operation}' field
    SubrequestMissingField {
        /// The service that responded.
        service: String,

        /// The operation whose field was absent.
        operation: String,
    },
}

impl FetchError {
    pub(crate) fn graphql_errors(
        service: &str,
        operation: &str,
        errors: Vec<graphql::Error>,
    ) -> Self {
        let reason = errors
            .iter()
            .map(|error| error.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        FetchError::SubrequestGraphQLErrors {
            service: service.to_string(),
            operation: operation.to_string(),
            reason,
            errors,
        }
    }

    /// The stable code put in the `code` extension of the GraphQL error.
    pub fn extension_code(&self) -> &'static str {
        match self {
            FetchError::MalformedRequest { .. } => "MALFORMED_REQUEST",
            FetchError::SubrequestHttpError { .. } => "SUBREQUEST_HTTP_ERROR",
            FetchError::SubrequestMalformedResponse { .. } => "SUBREQUEST_MALFORMED_RESPONSE",
            FetchError::SubrequestGraphQLErrors { .. } => "SUBREQUEST_GRAPHQL_ERRORS",
            FetchError::SubrequestMissingField { .. } => "SUBREQUEST_MISSING_FIELD",
        }
    }

    fn service(&self) -> Option<&str> {
        match self {
            FetchError::MalformedRequest { .. } => None,
            FetchError::SubrequestHttpError { service, .. }
            | FetchError::SubrequestMalformedResponse { service, .. }
            | FetchError::SubrequestGraphQLErrors { service, .. }
            | FetchError::SubrequestMissingField { service, .. } => Some(service),
        }
    }

    fn fill_extensions(&self, extensions: &mut ErrorExtensionValues) {
        extensions.set("code", self.extension_code());
        if let Some(service) = self.service() {
            extensions.set("service", service);
        }
        match self {
            FetchError::SubrequestHttpError {
                status_code: Some(status_code),
                ..
            } => {
                if let Ok(http) = Value::from_json(serde_json::json!({ "status": status_code })) {
                    extensions.set("http", http);
                }
            }
            FetchError::SubrequestGraphQLErrors { errors, .. } => {
                extensions.set(
                    "upstream_errors",
                    Value::List(
                        errors
                            .iter()
                            .map(|error| Value::String(error.message.clone()))
                            .collect(),
                    ),
                );
            }
            _ => (),
        }
    }
}

impl ErrorExtensions for FetchError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string())
            .extend_with(|_, extensions| self.fill_extensions(extensions))
    }
}

/// Error types for the gateway's HTTP server lifecycle.
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum GatewayError {
    /// failed to start the http server: {0}
    ServerCreationError(std::io::Error),

    /// the http server failed: {0}
    ServerError(std::io::Error),

    /// the http server task did not complete: {0}
    ServerTaskError(tokio::task::JoinError),
}
