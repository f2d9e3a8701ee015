pub mod handle_table;
pub mod kprocess;
pub mod lifecycle;
pub mod thread;

pub use handle_table::HandleTable;
pub use kprocess::Process;
pub use lifecycle::{ProcessStatus, StatusCell};
pub use thread::{ThreadFactory, ThreadParams};
