pub mod detector;
pub mod scheduler;
pub mod signals;
pub mod supervisor;
