pub mod auth;
pub mod botanical;
pub mod lots;
pub mod profile;
pub mod qr;
pub mod system;
