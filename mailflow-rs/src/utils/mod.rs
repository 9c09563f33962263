//! Utility modules
//!
//! - [`email`]: address checks for probe senders and recipients

pub mod email;

pub use email::{validate_email, validate_recipients};
