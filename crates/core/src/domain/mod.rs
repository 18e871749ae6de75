pub mod action;
pub mod availability;
pub mod booking;
pub mod contact;
pub mod thread;
pub mod widget;
