// Interfaces to collaborators outside the freezer.
//
// The group freeze policy is the only external query the freezer makes;
// production implementations live here, mocks for tests alongside.

pub mod group;

#[cfg(test)]
pub mod mocks;

pub use group::{GroupFreezePolicy, NoGroupFreeze, TaskSetPolicy};

#[cfg(test)]
pub use mocks::{MockGroupPolicy, ScriptedPolicy};
