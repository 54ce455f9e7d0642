pub mod encode;
pub mod restore;
