//! Remote service client for pulsekeeper.

pub mod endpoints;
pub mod roblox_client;

pub use roblox_client::RobloxClient;
