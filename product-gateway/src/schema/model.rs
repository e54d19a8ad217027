use async_graphql::SimpleObject;
use serde::Deserialize;
use serde::Serialize;

/// A product, as owned by the upstream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SimpleObject)]
#[graphql(rename_fields = "snake_case")]
pub struct Product {
    pub product_id: String,
    pub product_name: String,
    /// Inventory count.
    pub totalstock: i32,
    pub variant_id: String,
}

/// A variant of a product, sold by an external seller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SimpleObject)]
#[graphql(rename_fields = "snake_case")]
pub struct Variant {
    pub variant_id: String,
    /// Price in the upstream currency unit.
    pub price: f64,
    pub description: String,
    pub seller_id: String,
}
