mod controller;
mod keypress;
mod process;

pub(crate) use controller::*;
pub(crate) use keypress::*;
pub(crate) use process::*;
