pub mod asset_bay;
pub mod deck;
pub mod inspector;
