pub mod allocator;
pub mod types;

pub use allocator::allocate;
pub use types::{AllocationError, AllocationPlan, AssetWeight, Position, PriceQuote};
