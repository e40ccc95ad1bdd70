//! 外部事件触发模块

pub mod appointment;

pub use appointment::{AppointmentEvent, AppointmentStatus, AppointmentTrigger, compute_base_tokens};
