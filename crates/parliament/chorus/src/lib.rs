//! # parliament-chorus
//!
//! Assembles the seven subsystems behind one [`Chorus`] and coordinates them
//! per request:
//!
//! 1. pick the mode (explicit, or detected from the text);
//! 2. route through the interpreter;
//! 3. consult the subsystems the mode calls for, concurrently where they
//!    are independent;
//! 4. optionally compute a consensus score across perspectives;
//! 5. reflect on the whole exchange through the mirror.
//!
//! Every call goes through the compliance wrapper, so a constraint violation
//! surfaces as [`ChorusError::Compliance`]. A halted or escalated action is
//! not an error; it is reported on the [`ChorusResponse`].

#![deny(unsafe_code)]

mod chorus;
mod error;
pub mod mode;
mod response;

pub use chorus::{Chorus, ChorusStatus};
pub use error::ChorusError;
pub use mode::detect_mode;
pub use response::{AskRequest, ChorusResponse, Consensus, Perspective, SubsystemOutputs};
