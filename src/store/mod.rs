pub mod file;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use file::*;
pub use memory::*;
pub use postgres::*;
pub use traits::*;
