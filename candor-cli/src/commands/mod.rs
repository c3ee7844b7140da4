pub mod address;
pub mod hash;
pub mod session;
pub mod verify;
pub mod vouch;
