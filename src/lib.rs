pub mod clock;
pub mod config;
pub mod counter;
pub mod csv;
pub mod engine;
pub mod model;
pub mod reward;
pub mod store;

pub use engine::{Admission, AdmissionMode, Engine};
pub use model::{AccountId, Command, Coupon, CouponId, CouponStatus, Event, EventId, NewEvent};
