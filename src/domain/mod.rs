mod calendar;
mod category;
mod money;
mod product;
mod projection;
mod recurring;
mod summary;
mod transaction;

pub use calendar::*;
pub use category::*;
pub use money::*;
pub use product::*;
pub use projection::*;
pub use recurring::*;
pub use summary::*;
pub use transaction::*;

/// Identifier of the user every record belongs to.
pub type OwnerId = uuid::Uuid;
