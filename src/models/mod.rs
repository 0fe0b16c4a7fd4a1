pub mod branch;
pub mod location;
pub mod order;
pub mod order_event;
pub mod rider;
