//! Stack lifecycle procedures and their external collaborators

pub mod compose;
pub mod fsm;
pub mod git;
pub mod launcher;
pub mod readiness;
pub mod stop;
pub mod update;
