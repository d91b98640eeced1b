#![forbid(unsafe_code)]
#![allow(clippy::too_many_arguments)]

pub mod conf;
pub mod game;
pub mod rng;
pub mod ruleset;
pub mod util;
