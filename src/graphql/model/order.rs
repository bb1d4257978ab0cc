use bson::Uuid;
use serde::{Deserialize, Serialize};

/// A fulfilled order, entitling its user to review the contained products.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    /// UUID of the order.
    pub _id: Uuid,
    /// UUID of the user who placed the order.
    pub user_id: Uuid,
    /// UUIDs of the products contained in the order.
    pub product_ids: Vec<Uuid>,
}

impl Order {
    pub fn contains(&self, product_id: Uuid) -> bool {
        self.product_ids.contains(&product_id)
    }
}
