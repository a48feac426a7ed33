#![no_std]

pub mod result;
pub mod signal;
