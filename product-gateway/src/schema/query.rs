use async_graphql::Context;
use async_graphql::Object;

use super::forward;
use super::model::Product;
use super::model::Variant;
use super::operations::PRODUCT;
use super::operations::PRODUCTS;
use super::operations::VARIANT;
use super::operations::VARIANTS;
use crate::upstream::Variables;

/*
  type Query {
    products: [Product]
    product(id: String!): Product
    variants: [Variant]
    variant(id: String!): Variant
  }
*/
pub struct Query;

#[Object(rename_args = "snake_case")]
impl Query {
    async fn products(
        &self,
        ctx: &Context<'_>,
    ) -> async_graphql::Result<Option<Vec<Option<Product>>>> {
        forward(ctx, &PRODUCTS, Variables::new()).await
    }

    async fn product(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> async_graphql::Result<Option<Product>> {
        forward(ctx, &PRODUCT, Variables::new().set("id", id)).await
    }

    async fn variants(
        &self,
        ctx: &Context<'_>,
    ) -> async_graphql::Result<Option<Vec<Option<Variant>>>> {
        forward(ctx, &VARIANTS, Variables::new()).await
    }

    async fn variant(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> async_graphql::Result<Option<Variant>> {
        forward(ctx, &VARIANT, Variables::new().set("id", id)).await
    }
}
