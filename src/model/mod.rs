pub mod annotation;
pub mod application;
pub mod change;
pub mod common;
pub mod reference;
pub mod report;
pub mod snapshot;

pub use annotation::*;
pub use application::*;
pub use change::*;
pub use common::*;
pub use reference::*;
pub use report::*;
pub use snapshot::*;
