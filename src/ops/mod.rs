pub mod ai;
pub mod compositor;
pub mod export;
