//! HTML views rendered with askama.

pub mod views;
