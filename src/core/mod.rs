//! Core module containing the main functionality of Paxlink
//!
//! This module provides:
//! - Wire protocol: frame codec and byte-stream reassembly
//! - Terminal session driving sync, sale, and refund exchanges
//! - Transport layer for the serial link

pub mod protocol;
pub mod session;
pub mod transport;
