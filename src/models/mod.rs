pub mod event;
pub mod feed;
pub mod notification;
pub mod user;
