mod steps;
mod vending_world;

pub use vending_world::VendingWorld;
