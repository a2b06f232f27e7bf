use std::collections::HashMap;

use cucumber::World;
use vending_engine::{db_types::OrderId, OrderFlowError};

use crate::support::{TestFlowApi, TestSystem};

#[derive(Default, World)]
pub struct VendingWorld {
    pub system: Option<TestSystem>,
    /// Slot ids, by slot number.
    pub slots: HashMap<i64, i64>,
    pub order_id: Option<OrderId>,
    pub last_error: Option<OrderFlowError>,
}

impl std::fmt::Debug for VendingWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendingWorld")
            .field("db", &self.system.as_ref().map(|s| s.db_path.as_str()))
            .field("slots", &self.slots)
            .field("order_id", &self.order_id)
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl VendingWorld {
    pub fn system(&self) -> &TestSystem {
        self.system.as_ref().expect("Vending system not initialised")
    }

    pub fn api(&self) -> &TestFlowApi {
        &self.system().api
    }

    pub fn slot_id(&self, slot_number: i64) -> i64 {
        *self.slots.get(&slot_number).unwrap_or_else(|| panic!("Slot {slot_number} was not stocked"))
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id.clone().expect("No order has been placed")
    }
}
