//! Data models

pub mod source;
pub mod activity;
pub mod alert;
pub mod user;

pub use source::*;
pub use activity::*;
pub use alert::*;
pub use user::*;
