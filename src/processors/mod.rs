//! Concrete [`crate::traverser::Processor`] implementations (§4.8–§4.9,
//! components C8a–C8c).

pub mod extract;
pub mod list;
pub mod verify;

pub use extract::ExtractProcessor;
pub use list::{ListEntry, ListProcessor};
pub use verify::{VerifyEntry, VerifyProcessor};
