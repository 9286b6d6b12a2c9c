pub mod plan;
pub mod rate_structure;
pub mod types;

pub use plan::*;
pub use rate_structure::*;
pub use types::*;
