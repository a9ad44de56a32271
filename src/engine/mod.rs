pub mod booking;
pub mod dispatch;
pub mod drivers;
pub mod filters;
pub mod location;
pub mod matching;
pub mod scheduler;
