pub mod booking;
pub mod driver;
pub mod gender;
pub mod location;
pub mod notification;
pub mod otp;
pub mod page;
pub mod passenger;
pub mod receipt;
pub mod review;
