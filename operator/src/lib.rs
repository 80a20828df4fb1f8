//! Stack operator library
//!
//! Start, stop and self-update procedures for a docker compose service stack.

pub mod app;
pub mod deploy;
pub mod descriptor;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod storage;
pub mod utils;
