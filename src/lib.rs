#![cfg_attr(not(test), no_std)]

#[macro_use] pub mod log;
pub mod boot_machine;
pub mod comms;
pub mod config;
pub mod consts;
pub mod flash;
pub mod packet;
pub mod sync;
pub mod timeout;

#[cfg(test)]
mod test_support;

pub use crate::{
    boot_machine::{BootError, BootMachine, Outcome, State},
    config::BootConfig,
};
