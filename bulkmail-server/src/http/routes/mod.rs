//! Route handlers organized by resource

pub mod contacts;
pub mod health;
pub mod lists;
pub mod sends;
pub mod tracking;
pub mod upload;
pub mod users;
