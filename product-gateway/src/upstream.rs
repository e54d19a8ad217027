//! Forwards gateway operations to the upstream GraphQL endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_graphql::MaybeUndefined;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::Instrument;
use url::Url;

use crate::configuration::ConfigurationError;
use crate::configuration::Upstream;
use crate::error::FetchError;
use crate::graphql;
use crate::graphql::Object;
use crate::schema::operations::Operation;

/// The variables sent along an upstream document.
///
/// Holds exactly what the caller supplied: omitted optional arguments are left out, an
/// explicit `null` is kept.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Variables(Object);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a required argument.
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    /// Sets an optional argument, preserving the difference between absent and `null`.
    pub fn set_maybe<T: Into<Value>>(mut self, name: &str, value: MaybeUndefined<T>) -> Self {
        match value {
            MaybeUndefined::Undefined => {}
            MaybeUndefined::Null => {
                self.0.insert(name.to_string(), Value::Null);
            }
            MaybeUndefined::Value(value) => {
                self.0.insert(name.to_string(), value.into());
            }
        }
        self
    }

    pub fn into_object(self) -> Object {
        self.0
    }
}

/// Sends one upstream request per operation.
///
/// Cloning is cheap and shares the underlying connection pool.
#[derive(Clone, Debug)]
pub struct Forwarder {
    service: Arc<String>,
    url: Arc<Url>,
    http_client: reqwest::Client,
}

impl Forwarder {
    /// Builds a forwarder for the configured upstream.
    pub fn new(upstream: &Upstream) -> Result<Self, ConfigurationError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let secret_header = HeaderName::from_bytes(upstream.admin_secret_header.as_bytes())
            .map_err(|err| ConfigurationError::InvalidConfiguration {
                message: "invalid 'upstream.admin_secret_header'",
                error: err.to_string(),
            })?;
        let mut secret = HeaderValue::from_str(&upstream.admin_secret).map_err(|err| {
            ConfigurationError::InvalidConfiguration {
                message: "invalid 'upstream.admin_secret'",
                error: err.to_string(),
            }
        })?;
        secret.set_sensitive(true);
        headers.insert(secret_header, secret);

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .tcp_keepalive(Some(Duration::from_secs(5)));
        if let Some(timeout) = upstream.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client =
            builder
                .build()
                .map_err(|err| ConfigurationError::InvalidConfiguration {
                    message: "could not build the upstream http client",
                    error: err.to_string(),
                })?;

        Ok(Self {
            service: Arc::new(upstream.name.clone()),
            url: Arc::new(upstream.url.clone()),
            http_client,
        })
    }

    /// Performs one upstream round trip and returns `data.<operation name>` untouched.
    pub async fn forward(
        &self,
        operation: &Operation,
        variables: Variables,
    ) -> Result<Value, FetchError> {
        let span = tracing::info_span!(
            "upstream_request",
            operation = operation.name,
            kind = %operation.kind,
            service = %self.service,
        );
        self.round_trip(operation, variables).instrument(span).await
    }

    /// Like [`Forwarder::forward`], decoding the result into the operation's declared type.
    pub async fn forward_as<T: DeserializeOwned>(
        &self,
        operation: &Operation,
        variables: Variables,
    ) -> Result<T, FetchError> {
        let value = self.forward(operation, variables).await?;
        serde_json::from_value(value).map_err(|err| FetchError::SubrequestMalformedResponse {
            service: self.service.to_string(),
            reason: format!("'{}' does not match the declared type: {err}", operation.name),
        })
    }

    async fn round_trip(
        &self,
        operation: &Operation,
        variables: Variables,
    ) -> Result<Value, FetchError> {
        if let Some(missing) = operation
            .arguments
            .iter()
            .find(|argument| argument.is_required() && !variables.0.contains_key(argument.name))
        {
            return Err(FetchError::MalformedRequest {
                reason: format!(
                    "'{}' requires argument '{}'",
                    operation.name, missing.name
                ),
            });
        }

        let request = graphql::Request::new(operation.document(), variables.into_object());
        tracing::debug!(query = %request.query, "sending upstream request");

        let response = self
            .http_client
            .post(self.url.as_str())
            .json(&request)
            .send()
            .await
            .map_err(|err| self.http_error(err.status(), err.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| self.http_error(Some(status), err.to_string()))?;
        tracing::debug!(status = status.as_u16(), "received upstream response");

        let envelope: graphql::Response = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(err) if status.is_success() => {
                return Err(FetchError::SubrequestMalformedResponse {
                    service: self.service.to_string(),
                    reason: err.to_string(),
                });
            }
            Err(_) => return Err(self.http_error(Some(status), status.to_string())),
        };

        self.unwrap_field(operation, status, envelope)
    }

    fn unwrap_field(
        &self,
        operation: &Operation,
        status: StatusCode,
        response: graphql::Response,
    ) -> Result<Value, FetchError> {
        match response.field(operation.name).cloned() {
            Some(value) if !value.is_null() => {
                if !response.errors.is_empty() {
                    tracing::warn!(
                        errors = response.errors.len(),
                        "upstream returned errors alongside data"
                    );
                }
                Ok(value)
            }
            _ if !response.errors.is_empty() => Err(FetchError::graphql_errors(
                &self.service,
                operation.name,
                response.errors,
            )),
            Some(_) => Ok(Value::Null),
            None if !status.is_success() => Err(self.http_error(Some(status), status.to_string())),
            None => Err(FetchError::SubrequestMissingField {
                service: self.service.to_string(),
                operation: operation.name.to_string(),
            }),
        }
    }

    fn http_error(&self, status: Option<StatusCode>, reason: String) -> FetchError {
        FetchError::SubrequestHttpError {
            status_code: status.map(|status| status.as_u16()),
            service: self.service.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tracing_test::traced_test;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::body_json;
    use wiremock::matchers::header;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    use super::*;
    use crate::schema::model::Product;
    use crate::schema::operations::BUY_PRODUCT;
    use crate::schema::operations::DELETE_VARIANT;
    use crate::schema::operations::PRODUCT;
    use crate::schema::operations::PRODUCTS;
    use crate::schema::operations::UPDATE_PRODUCT;

    fn forwarder(mock_server: &MockServer) -> Forwarder {
        Forwarder::new(
            &Upstream::builder()
                .name("hasura")
                .url(Url::parse(&format!("{}/v1/graphql", mock_server.uri())).unwrap())
                .admin_secret("admin-secret")
                .build(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn sends_document_variables_and_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/graphql"))
            .and(header("content-type", "application/json"))
            .and(header("x-hasura-admin-secret", "admin-secret"))
            .and(body_json(json!({
                "query": "query($id: String!) { product(id: $id) { product_id, product_name, totalstock, variant_id } }",
                "variables": { "id": "p1" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "product": {
                        "product_id": "p1",
                        "product_name": "Widget",
                        "totalstock": 10,
                        "variant_id": "v1"
                    }
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let product: Option<Product> = forwarder(&mock_server)
            .forward_as(&PRODUCT, Variables::new().set("id", "p1"))
            .await
            .unwrap();

        assert_eq!(
            product,
            Some(Product {
                product_id: "p1".to_string(),
                product_name: "Widget".to_string(),
                totalstock: 10,
                variant_id: "v1".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn no_variables_for_operations_without_arguments() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({
                "query": "{ products { product_id, product_name, totalstock, variant_id } }"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "products": [] } })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let value = forwarder(&mock_server)
            .forward(&PRODUCTS, Variables::new())
            .await
            .unwrap();
        assert_eq!(value, json!([]));
    }

    #[tokio::test]
    async fn returns_payload_unmodified() {
        let mock_server = MockServer::start().await;
        let payload = json!({
            "product_id": "p1",
            "product_name": "Widget",
            "totalstock": 8,
            "variant_id": "v1",
            "extra": { "kept": true }
        });
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": { "buyProduct": payload.clone() } })),
            )
            .mount(&mock_server)
            .await;

        let value = forwarder(&mock_server)
            .forward(
                &BUY_PRODUCT,
                Variables::new().set("product_id", "p1").set("quantity", 2),
            )
            .await
            .unwrap();
        assert_eq!(value, payload);
    }

    #[tokio::test]
    async fn optional_arguments_keep_null_and_drop_undefined() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "updateProduct": null } })),
            )
            .mount(&mock_server)
            .await;

        let variables = Variables::new()
            .set("product_id", "p1")
            .set_maybe("product_name", MaybeUndefined::<String>::Null)
            .set_maybe("totalstock", MaybeUndefined::Value(4))
            .set_maybe("variant_id", MaybeUndefined::<String>::Undefined);
        forwarder(&mock_server)
            .forward(&UPDATE_PRODUCT, variables)
            .await
            .unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        assert_eq!(
            body["variables"],
            json!({ "product_id": "p1", "product_name": null, "totalstock": 4 })
        );
    }

    #[tokio::test]
    async fn explicit_null_is_a_result() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "product": null } })),
            )
            .mount(&mock_server)
            .await;

        let product: Option<Product> = forwarder(&mock_server)
            .forward_as(&PRODUCT, Variables::new().set("id", "missing"))
            .await
            .unwrap();
        assert_eq!(product, None);
    }

    #[tokio::test]
    async fn errors_without_data_fail() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{ "message": "field 'deleteVariant' not found in type: 'mutation_root'" }]
            })))
            .mount(&mock_server)
            .await;

        let error = forwarder(&mock_server)
            .forward(&DELETE_VARIANT, Variables::new().set("variant_id", "v9"))
            .await
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "service 'hasura' returned errors for 'deleteVariant': field 'deleteVariant' not found in type: 'mutation_root'"
        );
    }

    #[tokio::test]
    async fn errors_with_null_field_fail() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "buyProduct": null },
                "errors": [{ "message": "not enough stock", "path": ["buyProduct"] }]
            })))
            .mount(&mock_server)
            .await;

        let error = forwarder(&mock_server)
            .forward(
                &BUY_PRODUCT,
                Variables::new().set("product_id", "p1").set("quantity", 200),
            )
            .await
            .unwrap_err();
        assert_eq!(error.extension_code(), "SUBREQUEST_GRAPHQL_ERRORS");
    }

    #[tokio::test]
    #[traced_test]
    async fn errors_alongside_data_are_logged() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "deleteVariant": "v9" },
                "errors": [{ "message": "audit log unavailable" }]
            })))
            .mount(&mock_server)
            .await;

        let value = forwarder(&mock_server)
            .forward(&DELETE_VARIANT, Variables::new().set("variant_id", "v9"))
            .await
            .unwrap();
        assert_eq!(value, json!("v9"));
        assert!(logs_contain("upstream returned errors alongside data"));
    }

    #[tokio::test]
    async fn missing_field_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {} })))
            .mount(&mock_server)
            .await;

        let error = forwarder(&mock_server)
            .forward(&PRODUCTS, Variables::new())
            .await
            .unwrap_err();
        assert_eq!(
            error,
            FetchError::SubrequestMissingField {
                service: "hasura".to_string(),
                operation: "products".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&mock_server)
            .await;

        let error = forwarder(&mock_server)
            .forward(&PRODUCTS, Variables::new())
            .await
            .unwrap_err();
        assert_eq!(error.extension_code(), "SUBREQUEST_MALFORMED_RESPONSE");
    }

    #[tokio::test]
    async fn non_json_error_status_is_an_http_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&mock_server)
            .await;

        let error = forwarder(&mock_server)
            .forward(&PRODUCTS, Variables::new())
            .await
            .unwrap_err();
        assert_eq!(
            error,
            FetchError::SubrequestHttpError {
                status_code: Some(502),
                service: "hasura".to_string(),
                reason: "502 Bad Gateway".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn error_status_with_data_still_returns_data() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({ "data": { "deleteProduct": "p1" } })),
            )
            .mount(&mock_server)
            .await;

        let value = forwarder(&mock_server)
            .forward(
                &crate::schema::operations::DELETE_PRODUCT,
                Variables::new().set("product_id", "p1"),
            )
            .await
            .unwrap();
        assert_eq!(value, json!("p1"));
    }

    #[tokio::test]
    async fn error_status_without_data_is_an_http_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({})))
            .mount(&mock_server)
            .await;

        let error = forwarder(&mock_server)
            .forward(&PRODUCTS, Variables::new())
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            FetchError::SubrequestHttpError {
                status_code: Some(503),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_an_http_error() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let forwarder = Forwarder::new(
            &Upstream::builder()
                .url(Url::parse(&format!("http://127.0.0.1:{port}/v1/graphql")).unwrap())
                .admin_secret("admin-secret")
                .build(),
        )
        .unwrap();

        let error = forwarder
            .forward(&PRODUCTS, Variables::new())
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            FetchError::SubrequestHttpError {
                status_code: None,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn payload_of_wrong_shape_is_malformed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "product": { "product_id": "p1" } }
            })))
            .mount(&mock_server)
            .await;

        let error = forwarder(&mock_server)
            .forward_as::<Option<Product>>(&PRODUCT, Variables::new().set("id", "p1"))
            .await
            .unwrap_err();
        assert_eq!(error.extension_code(), "SUBREQUEST_MALFORMED_RESPONSE");
        assert!(error.to_string().contains("'product' does not match the declared type"));
    }

    #[tokio::test]
    async fn timeout_is_an_http_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": { "products": [] } }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let forwarder = Forwarder::new(
            &Upstream::builder()
                .url(Url::parse(&mock_server.uri()).unwrap())
                .admin_secret("admin-secret")
                .timeout(Duration::from_millis(100))
                .build(),
        )
        .unwrap();
        let error = forwarder
            .forward(&PRODUCTS, Variables::new())
            .await
            .unwrap_err();
        assert!(matches!(error, FetchError::SubrequestHttpError { .. }));
    }

    #[tokio::test]
    async fn missing_required_argument_is_not_sent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let error = forwarder(&mock_server)
            .forward(&BUY_PRODUCT, Variables::new().set("product_id", "p1"))
            .await
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "request was malformed: 'buyProduct' requires argument 'quantity'"
        );
    }

    #[test]
    fn invalid_secret_is_a_configuration_error() {
        let error = Forwarder::new(
            &Upstream::builder()
                .url(Url::parse("http://localhost:8080/v1/graphql").unwrap())
                .admin_secret("line\nbreak")
                .build(),
        )
        .unwrap_err();
        assert_eq!(
            error.to_string(),
            "invalid 'upstream.admin_secret': failed to parse header value"
        );
    }

    #[tokio::test]
    async fn configured_secret_header_is_sent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-admin-key", "admin-secret"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "products": [] } })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let forwarder = Forwarder::new(
            &Upstream::builder()
                .url(Url::parse(&mock_server.uri()).unwrap())
                .admin_secret("admin-secret")
                .admin_secret_header("x-admin-key")
                .build(),
        )
        .unwrap();
        let value = forwarder
            .forward(&PRODUCTS, Variables::new())
            .await
            .unwrap();
        assert_eq!(value, json!([]));

        let requests = mock_server.received_requests().await.unwrap();
        assert!(!requests[0].headers.contains_key("x-hasura-admin-secret"));
    }

    #[tokio::test]
    async fn errors_without_message_are_still_upstream_errors() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{ "extensions": { "code": "access-denied" } }]
            })))
            .mount(&mock_server)
            .await;

        let error = forwarder(&mock_server)
            .forward(&PRODUCTS, Variables::new())
            .await
            .unwrap_err();
        assert_eq!(error.extension_code(), "SUBREQUEST_GRAPHQL_ERRORS");
    }

    #[test]
    fn invalid_secret_header_name_is_rejected() {
        let error = Forwarder::new(
            &Upstream::builder()
                .url(Url::parse("http://localhost:8080/v1/graphql").unwrap())
                .admin_secret("secret")
                .admin_secret_header("not a header")
                .build(),
        )
        .unwrap_err();
        assert!(matches!(
            error,
            ConfigurationError::InvalidConfiguration { message, .. }
                if message == "invalid 'upstream.admin_secret_header'"
        ));
    }
}
