pub mod address;
pub mod models;
pub mod provider;
pub mod reconciler;
pub mod verify;
