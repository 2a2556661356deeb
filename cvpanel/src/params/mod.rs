pub mod descriptor;
pub mod store;
pub mod visit;

pub use descriptor::*;
pub use store::*;
pub use visit::VisitMarker;
