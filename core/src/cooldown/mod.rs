//! Inter-round cooldown orchestration
//!
//! A [`CooldownSession`] owns the cooldown countdown and resolves a one-shot
//! readiness signal, whether or not an external battle machine is present.

mod session;


pub use session::{
    CooldownMode, CooldownOptions, CooldownSession, DispatchOutcome, ReadySource, ReadyState,
};
