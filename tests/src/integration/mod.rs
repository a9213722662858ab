//! Cross-component scenarios over a single replica.

pub mod harness;

mod ambiguity;
mod intents;
mod latches;
mod leases;
mod one_phase_commit;
