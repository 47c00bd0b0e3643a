// src/lib.rs

#[macro_use]
pub mod macros;

#[macro_use]
pub mod log;

pub mod core;
pub mod params;

pub mod cli;
pub mod error;
pub mod keypad;
pub mod model;
pub mod pages;
pub mod session;
pub mod site;
