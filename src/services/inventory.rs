use crate::entities::product::{self, Entity as Product};
use crate::errors::ServiceError;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::{debug, warn};
use uuid::Uuid;

/// Inventory ledger over the `products` table.
///
/// Stateless on purpose: every operation takes the caller's connection so a
/// reserve or release joins whatever transaction the caller has open.
/// Reservations and releases are single conditional UPDATE statements, so
/// concurrent callers can never drive stock negative regardless of
/// interleaving.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryService;

impl InventoryService {
    pub fn new() -> Self {
        Self
    }

    /// Loads a product or reports it missing.
    pub async fn load<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        Product::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Checks that the requested variant exists and the product ships to the
    /// destination pin code. Pure validation; no stock is touched.
    pub fn check_eligibility(
        &self,
        product: &product::Model,
        pin_code: &str,
        color: &str,
        size: &str,
    ) -> Result<(), ServiceError> {
        if !product.ships_to(pin_code) {
            return Err(ServiceError::InvalidInput(format!(
                "{} is not deliverable to pin code {}",
                product.name, pin_code
            )));
        }
        if !product.allows_selection(color, size) {
            return Err(ServiceError::InvalidInput(format!(
                "{} is not available in color '{}' and size '{}'",
                product.name, color, size
            )));
        }
        Ok(())
    }

    /// Atomically decrements stock if at least `quantity` units remain.
    ///
    /// The guard lives in the WHERE clause, so two racing reservations for
    /// the last unit resolve to exactly one winner; the loser sees zero
    /// affected rows and gets `InsufficientStock`.
    pub async fn reserve<C: ConnectionTrait>(
        &self,
        conn: &C,
        product: &product::Model,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidInput(format!(
                "Reservation quantity must be positive, got {}",
                quantity
            )));
        }

        let result = Product::update_many()
            .col_expr(
                product::Column::Inventory,
                Expr::col(product::Column::Inventory).sub(quantity),
            )
            .filter(product::Column::Id.eq(product.id))
            .filter(product::Column::Inventory.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            warn!(
                product_id = %product.id,
                requested = quantity,
                "inventory reservation refused"
            );
            return Err(ServiceError::InsufficientStock(format!(
                "Not enough inventory for {}",
                product.name
            )));
        }

        debug!(product_id = %product.id, quantity = quantity, "inventory reserved");
        Ok(())
    }

    /// Returns previously reserved units to stock.
    ///
    /// Callers gate releases on a successful status compare-and-set, so a
    /// given reservation is handed back at most once.
    pub async fn release<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidInput(format!(
                "Release quantity must be positive, got {}",
                quantity
            )));
        }

        let result = Product::update_many()
            .col_expr(
                product::Column::Inventory,
                Expr::col(product::Column::Inventory).add(quantity),
            )
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            // Product deleted out from under an open order. Log and move on;
            // there is no stock row left to restore.
            warn!(product_id = %product_id, "release skipped, product no longer exists");
            return Ok(());
        }

        debug!(product_id = %product_id, quantity = quantity, "inventory released");
        Ok(())
    }
}
