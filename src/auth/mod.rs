// src/auth/mod.rs

pub mod access;
pub mod identity;
pub mod key_cache;
pub mod middleware;
pub mod session;
