// Route handlers
pub mod batch;
pub mod health;
pub mod subscription;
