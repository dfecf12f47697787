//! Top-level facade crate for funcie.
//!
//! Re-exports the protocol model and the bastion runtime so users can depend
//! on a single crate.

pub mod core {
    pub use funcie_core::*;
}

pub mod bastion {
    pub use funcie_bastion::*;
}
