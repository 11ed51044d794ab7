pub mod connection;
pub mod delivery;
pub mod rooms;

pub use delivery::{DeliveryCoordinator, DeliveryMode};
pub use rooms::{Channel, RoomRouter};
