pub mod stat;
pub mod system;
