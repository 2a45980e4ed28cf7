//! Windows memory management APIs

pub mod handle;
pub mod memory;
pub mod process;
pub mod system;
pub mod token;

pub use memory::WindowsMemoryControl;
