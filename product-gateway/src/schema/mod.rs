//! The gateway's public GraphQL contract.
//!
//! Every root field resolves by forwarding itself to the upstream through the [`Forwarder`]
//! stored in the schema data.

pub mod model;
pub mod operations;

mod mutation;
mod query;

use async_graphql::Context;
use async_graphql::EmptySubscription;
use async_graphql::ErrorExtensions;
use async_graphql::Schema;
use async_graphql::SchemaBuilder;
use serde::de::DeserializeOwned;

pub use self::mutation::Mutation;
pub use self::query::Query;
use self::operations::Operation;
use crate::upstream::Forwarder;
use crate::upstream::Variables;

pub type GatewaySchema = Schema<Query, Mutation, EmptySubscription>;

fn builder() -> SchemaBuilder<Query, Mutation, EmptySubscription> {
    Schema::build(Query, Mutation, EmptySubscription)
}

/// Builds the executable schema around `forwarder`.
pub fn build_schema(forwarder: Forwarder) -> GatewaySchema {
    builder().data(forwarder).finish()
}

/// The gateway schema in SDL.
pub fn sdl() -> String {
    builder().finish().sdl()
}

pub(crate) async fn forward<T: DeserializeOwned>(
    ctx: &Context<'_>,
    operation: &Operation,
    variables: Variables,
) -> async_graphql::Result<T> {
    let forwarder = ctx.data::<Forwarder>()?;
    forwarder
        .forward_as(operation, variables)
        .await
        .map_err(|error| error.extend())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use serde_json::json;

    use super::operations::OPERATIONS;
    use super::operations::OperationKind;
    use super::*;

    const INTROSPECTION: &str = r#"
        {
          __schema {
            queryType { fields { ...Root } }
            mutationType { fields { ...Root } }
          }
        }
        fragment Root on __Field {
          name
          args { name type { kind name ofType { name } } }
        }
    "#;

    fn type_text(ty: &Value) -> String {
        match ty["kind"].as_str() {
            Some("NON_NULL") => format!("{}!", ty["ofType"]["name"].as_str().unwrap()),
            _ => ty["name"].as_str().unwrap().to_string(),
        }
    }

    fn root_fields(fields: &Value) -> Vec<(String, Vec<(String, String)>)> {
        fields
            .as_array()
            .unwrap()
            .iter()
            .map(|field| {
                let args = field["args"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|arg| {
                        (
                            arg["name"].as_str().unwrap().to_string(),
                            type_text(&arg["type"]),
                        )
                    })
                    .collect();
                (field["name"].as_str().unwrap().to_string(), args)
            })
            .collect()
    }

    fn registry(kind: OperationKind) -> Vec<(String, Vec<(String, String)>)> {
        OPERATIONS
            .iter()
            .filter(|operation| operation.kind == kind)
            .map(|operation| {
                let args = operation
                    .arguments
                    .iter()
                    .map(|argument| (argument.name.to_string(), argument.ty.to_string()))
                    .collect();
                (operation.name.to_string(), args)
            })
            .collect()
    }

    #[tokio::test]
    async fn registry_matches_executable_schema() {
        let response = builder().finish().execute(INTROSPECTION).await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let data = response.data.into_json().unwrap();

        assert_eq!(
            root_fields(&data["__schema"]["queryType"]["fields"]),
            registry(OperationKind::Query)
        );
        assert_eq!(
            root_fields(&data["__schema"]["mutationType"]["fields"]),
            registry(OperationKind::Mutation)
        );
    }

    #[test]
    fn sdl_keeps_snake_case() {
        let sdl = sdl();
        assert!(sdl.contains("product(id: String!): Product"), "{sdl}");
        assert!(sdl.contains("products: [Product]"), "{sdl}");
        assert!(
            sdl.contains("buyProduct(product_id: String!, quantity: Int!): Product"),
            "{sdl}"
        );
        assert!(sdl.contains("deleteVariant(variant_id: String!): String"), "{sdl}");
        assert!(sdl.contains("totalstock: Int!"), "{sdl}");
        assert!(sdl.contains("seller_id: String!"), "{sdl}");
    }

    #[tokio::test]
    async fn missing_forwarder_is_an_error() {
        let response = builder().finish().execute("{ products { product_id } }").await;
        assert_eq!(response.errors.len(), 1);
        assert_eq!(
            serde_json::to_value(&response.errors[0].path).unwrap(),
            json!(["products"])
        );
        assert!(response.data.into_json().unwrap()["products"].is_null());
    }
}
