//! Supervisor entry points and procedure options

pub mod options;
pub mod run;
