pub mod change_detector;
pub mod fixer;
pub mod storage_manager;
pub mod validity_checker;

pub use change_detector::*;
pub use fixer::*;
pub use storage_manager::*;
pub use validity_checker::*;
