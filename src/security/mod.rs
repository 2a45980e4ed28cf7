//! Token privilege handling

pub mod privileges;

pub use privileges::{Privilege, PrivilegeElevator};
