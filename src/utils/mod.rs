// src/utils/mod.rs

pub mod cookie;
pub mod form;
pub mod html;
