use std::sync::Arc;

use super::localization::Localizer;
use crate::domain::Order;
use crate::infrastructure::{Repository, Storage};

// =============================================================================
// AppState
// =============================================================================

/// Shared application dependencies.
///
/// The storage is a trait object so the backend can be chosen at startup by
/// `StorageFactory`.
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn Storage<Order>>,

    pub localizer: Arc<Localizer>,
}

impl AppState {
    #[must_use]
    pub fn new(orders: Arc<dyn Storage<Order>>, localizer: Localizer) -> Self {
        Self {
            orders,
            localizer: Arc::new(localizer),
        }
    }

    /// Opens a unit of work for one request.
    #[must_use]
    pub fn order_repository(&self) -> Repository<Order> {
        Repository::new(Arc::clone(&self.orders))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AppState")
            .field("orders", &"Arc<dyn Storage<Order>>")
            .field("localizer", &self.localizer.default_locale())
            .finish()
    }
}
