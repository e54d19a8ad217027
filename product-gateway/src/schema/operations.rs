//! Metadata for every operation the gateway exposes.
//!
//! Each [`Operation`] describes both sides of the forwarding contract: the arguments the
//! gateway accepts, and the upstream document it sends. Keep this table in sync with the
//! resolvers in [`super::query`] and [`super::mutation`].

use std::fmt;

/// Whether an operation reads or changes upstream state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Query => f.write_str("query"),
            OperationKind::Mutation => f.write_str("mutation"),
        }
    }
}

/// The fields selected on the upstream result.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Selection {
    Product,
    Variant,
    /// A leaf value such as the `String` returned by deletes.
    Scalar,
}

impl Selection {
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Selection::Product => &["product_id", "product_name", "totalstock", "variant_id"],
            Selection::Variant => &["variant_id", "price", "description", "seller_id"],
            Selection::Scalar => &[],
        }
    }
}

/// A declared argument: its name and GraphQL input type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Argument {
    pub name: &'static str,
    pub ty: &'static str,
}

impl Argument {
    const fn new(name: &'static str, ty: &'static str) -> Self {
        Self { name, ty }
    }

    /// Whether the caller must supply this argument.
    pub fn is_required(&self) -> bool {
        self.ty.ends_with('!')
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Operation {
    /// The root field name, identical on the gateway and on the upstream.
    pub name: &'static str,
    pub kind: OperationKind,
    pub arguments: &'static [Argument],
    pub selection: Selection,
}

impl Operation {
    /// Looks up an operation by its root field name.
    pub fn get(name: &str) -> Option<&'static Operation> {
        OPERATIONS
            .iter()
            .copied()
            .find(|operation| operation.name == name)
    }

    /// Renders the upstream document.
    ///
    /// Every argument is bound to a variable of the same name so that values always travel
    /// in the `variables` map, never inside the document text.
    pub fn document(&self) -> String {
        let selection = match self.selection.fields() {
            [] => String::new(),
            fields => format!(" {{ {} }}", fields.join(", ")),
        };

        if self.arguments.is_empty() {
            let field = format!("{}{selection}", self.name);
            return match self.kind {
                OperationKind::Query => format!("{{ {field} }}"),
                OperationKind::Mutation => format!("mutation {{ {field} }}"),
            };
        }

        let definitions = self
            .arguments
            .iter()
            .map(|argument| format!("${}: {}", argument.name, argument.ty))
            .collect::<Vec<_>>()
            .join(", ");
        let bindings = self
            .arguments
            .iter()
            .map(|argument| format!("{}: ${}", argument.name, argument.name))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "{}({definitions}) {{ {}({bindings}){selection} }}",
            self.kind, self.name
        )
    }
}

pub static PRODUCTS: Operation = Operation {
    name: "products",
    kind: OperationKind::Query,
    arguments: &[],
    selection: Selection::Product,
};

pub static PRODUCT: Operation = Operation {
    name: "product",
    kind: OperationKind::Query,
    arguments: &[Argument::new("id", "String!")],
    selection: Selection::Product,
};

pub static VARIANTS: Operation = Operation {
    name: "variants",
    kind: OperationKind::Query,
    arguments: &[],
    selection: Selection::Variant,
};

pub static VARIANT: Operation = Operation {
    name: "variant",
    kind: OperationKind::Query,
    arguments: &[Argument::new("id", "String!")],
    selection: Selection::Variant,
};

pub static CREATE_PRODUCT: Operation = Operation {
    name: "createProduct",
    kind: OperationKind::Mutation,
    arguments: &[
        Argument::new("product_name", "String!"),
        Argument::new("totalstock", "Int!"),
        Argument::new("variant_id", "String!"),
    ],
    selection: Selection::Product,
};

pub static UPDATE_PRODUCT: Operation = Operation {
    name: "updateProduct",
    kind: OperationKind::Mutation,
    arguments: &[
        Argument::new("product_id", "String!"),
        Argument::new("product_name", "String"),
        Argument::new("totalstock", "Int"),
        Argument::new("variant_id", "String"),
    ],
    selection: Selection::Product,
};

pub static DELETE_PRODUCT: Operation = Operation {
    name: "deleteProduct",
    kind: OperationKind::Mutation,
    arguments: &[Argument::new("product_id", "String!")],
    selection: Selection::Scalar,
};

pub static CREATE_VARIANT: Operation = Operation {
    name: "createVariant",
    kind: OperationKind::Mutation,
    arguments: &[
        Argument::new("price", "Float!"),
        Argument::new("description", "String!"),
        Argument::new("seller_id", "String!"),
    ],
    selection: Selection::Variant,
};

pub static UPDATE_VARIANT: Operation = Operation {
    name: "updateVariant",
    kind: OperationKind::Mutation,
    arguments: &[
        Argument::new("variant_id", "String!"),
        Argument::new("price", "Float"),
        Argument::new("description", "String"),
        Argument::new("seller_id", "String"),
    ],
    selection: Selection::Variant,
};

pub static DELETE_VARIANT: Operation = Operation {
    name: "deleteVariant",
    kind: OperationKind::Mutation,
    arguments: &[Argument::new("variant_id", "String!")],
    selection: Selection::Scalar,
};

pub static BUY_PRODUCT: Operation = Operation {
    name: "buyProduct",
    kind: OperationKind::Mutation,
    arguments: &[
        Argument::new("product_id", "String!"),
        Argument::new("quantity", "Int!"),
    ],
    selection: Selection::Product,
};

/// All operations, queries first.
pub static OPERATIONS: [&Operation; 11] = [
    &PRODUCTS,
    &PRODUCT,
    &VARIANTS,
    &VARIANT,
    &CREATE_PRODUCT,
    &UPDATE_PRODUCT,
    &DELETE_PRODUCT,
    &CREATE_VARIANT,
    &UPDATE_VARIANT,
    &DELETE_VARIANT,
    &BUY_PRODUCT,
];
