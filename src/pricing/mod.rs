pub mod cache_key;
pub mod credits;
pub mod estimator;
pub mod indexed;

pub use cache_key::*;
pub use credits::*;
pub use estimator::*;
pub use indexed::*;
