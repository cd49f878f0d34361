//! Wire-format codec for RTP and RTCP (RFC 3550), with no knowledge of
//! session state, scheduling, or transport — parsing and building only.

pub mod error;
pub mod rtcp;
pub mod rtp;

pub use error::Error;
