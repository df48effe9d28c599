pub mod calendar;
pub mod range;
pub mod week;
