pub mod expiry;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod reconciliation;
pub mod retry;
