mod enrollment;
mod transaction;

pub use enrollment::*;
pub use transaction::*;
