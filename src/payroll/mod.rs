pub mod clock;
pub mod commit;
pub mod lifecycle;
pub mod merkle;
pub mod models;
pub mod scheduler;
