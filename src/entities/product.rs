use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inventory-bearing view of a catalog product. This service mutates only
/// `inventory`; creation and deletion belong to the catalog collaborator.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub name: String,
    pub price: Decimal,

    /// Optional promotion: a matching code on the checkout request lowers the
    /// unit price by `offer_discount`.
    pub offer_code: Option<String>,
    pub offer_discount: Option<Decimal>,

    #[sea_orm(column_type = "Json")]
    pub colors: StringList,
    #[sea_orm(column_type = "Json")]
    pub sizes: StringList,
    #[sea_orm(column_type = "Json")]
    pub available_pin_codes: StringList,

    /// Non-negative stock count; the contended resource.
    pub inventory: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// JSON-backed list column, portable across Postgres and SQLite.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct StringList(pub Vec<String>);

impl StringList {
    pub fn contains(&self, value: &str) -> bool {
        self.0.iter().any(|v| v == value)
    }
}

impl From<Vec<&str>> for StringList {
    fn from(values: Vec<&str>) -> Self {
        Self(values.into_iter().map(str::to_string).collect())
    }
}

impl Model {
    pub fn ships_to(&self, pin_code: &str) -> bool {
        self.available_pin_codes.contains(pin_code)
    }

    pub fn allows_selection(&self, color: &str, size: &str) -> bool {
        self.colors.contains(color) && self.sizes.contains(size)
    }

    /// Unit price after applying an offer code, when it matches the
    /// product's configured code. Non-matching or absent codes leave the
    /// price unchanged.
    pub fn discounted_price(&self, applied_offer_code: Option<&str>) -> Decimal {
        match (&self.offer_code, self.offer_discount, applied_offer_code) {
            (Some(code), Some(discount), Some(applied)) if code == applied => {
                (self.price - discount).max(Decimal::ZERO)
            }
            _ => self.price,
        }
    }
}
