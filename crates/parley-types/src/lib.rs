pub mod api;
pub mod events;
pub mod models;
pub mod pair;
pub mod relationship;

pub use pair::PairKey;
