pub mod aggregate;
pub mod manual;
pub mod normalize;

pub use aggregate::*;
pub use manual::*;
pub use normalize::*;
