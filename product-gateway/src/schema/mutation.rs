use async_graphql::Context;
use async_graphql::MaybeUndefined;
use async_graphql::Object;

use super::forward;
use super::model::Product;
use super::model::Variant;
use super::operations::BUY_PRODUCT;
use super::operations::CREATE_PRODUCT;
use super::operations::CREATE_VARIANT;
use super::operations::DELETE_PRODUCT;
use super::operations::DELETE_VARIANT;
use super::operations::UPDATE_PRODUCT;
use super::operations::UPDATE_VARIANT;
use crate::upstream::Variables;

/*
  type Mutation {
    createProduct(product_name: String!, totalstock: Int!, variant_id: String!): Product
    updateProduct(product_id: String!, product_name: String, totalstock: Int, variant_id: String): Product
    deleteProduct(product_id: String!): String
    createVariant(price: Float!, description: String!, seller_id: String!): Variant
    updateVariant(variant_id: String!, price: Float, description: String, seller_id: String): Variant
    deleteVariant(variant_id: String!): String
    buyProduct(product_id: String!, quantity: Int!): Product
  }
*/
pub struct Mutation;

#[Object(rename_args = "snake_case")]
impl Mutation {
    async fn create_product(
        &self,
        ctx: &Context<'_>,
        product_name: String,
        totalstock: i32,
        variant_id: String,
    ) -> async_graphql::Result<Option<Product>> {
        let variables = Variables::new()
            .set("product_name", product_name)
            .set("totalstock", totalstock)
            .set("variant_id", variant_id);
        forward(ctx, &CREATE_PRODUCT, variables).await
    }

    // Only the supplied fields change upstream; an explicit null is forwarded.
    async fn update_product(
        &self,
        ctx: &Context<'_>,
        product_id: String,
        product_name: MaybeUndefined<String>,
        totalstock: MaybeUndefined<i32>,
        variant_id: MaybeUndefined<String>,
    ) -> async_graphql::Result<Option<Product>> {
        let variables = Variables::new()
            .set("product_id", product_id)
            .set_maybe("product_name", product_name)
            .set_maybe("totalstock", totalstock)
            .set_maybe("variant_id", variant_id);
        forward(ctx, &UPDATE_PRODUCT, variables).await
    }

    async fn delete_product(
        &self,
        ctx: &Context<'_>,
        product_id: String,
    ) -> async_graphql::Result<Option<String>> {
        forward(
            ctx,
            &DELETE_PRODUCT,
            Variables::new().set("product_id", product_id),
        )
        .await
    }

    async fn create_variant(
        &self,
        ctx: &Context<'_>,
        price: f64,
        description: String,
        seller_id: String,
    ) -> async_graphql::Result<Option<Variant>> {
        let variables = Variables::new()
            .set("price", price)
            .set("description", description)
            .set("seller_id", seller_id);
        forward(ctx, &CREATE_VARIANT, variables).await
    }

    async fn update_variant(
        &self,
        ctx: &Context<'_>,
        variant_id: String,
        price: MaybeUndefined<f64>,
        description: MaybeUndefined<String>,
        seller_id: MaybeUndefined<String>,
    ) -> async_graphql::Result<Option<Variant>> {
        let variables = Variables::new()
            .set("variant_id", variant_id)
            .set_maybe("price", price)
            .set_maybe("description", description)
            .set_maybe("seller_id", seller_id);
        forward(ctx, &UPDATE_VARIANT, variables).await
    }

    async fn delete_variant(
        &self,
        ctx: &Context<'_>,
        variant_id: String,
    ) -> async_graphql::Result<Option<String>> {
        forward(
            ctx,
            &DELETE_VARIANT,
            Variables::new().set("variant_id", variant_id),
        )
        .await
    }

    // Stock bookkeeping is left to the upstream.
    async fn buy_product(
        &self,
        ctx: &Context<'_>,
        product_id: String,
        quantity: i32,
    ) -> async_graphql::Result<Option<Product>> {
        let variables = Variables::new()
            .set("product_id", product_id)
            .set("quantity", quantity);
        forward(ctx, &BUY_PRODUCT, variables).await
    }
}
