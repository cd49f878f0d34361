use std::fmt;

/// Everything that can go wrong while parsing or building RTP/RTCP packets.
///
/// This mirrors the hand-rolled error style the rest of the workspace uses:
/// a plain enum, `Debug`-derived `Display`, no `thiserror`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Buffer too short to contain a complete fixed header.
    Truncated,
    /// `version` field was not 2.
    BadVersion,
    /// Padding flag set but the padding count is zero or exceeds the
    /// remaining bytes.
    BadPadding,
    /// CSRC list, extension header and padding together overrun the
    /// declared packet length.
    Overflow,
    /// The conservative RTP/RTCP disambiguation check in spec.md §4.1
    /// failed: `marker=1` with a payload type aliasing an RTCP SR/RR byte.
    AmbiguousRtpRtcp,
    /// Caller-supplied payload type is out of the legal 0..=127 range, or
    /// is one of the two values (72, 73) reserved for disambiguation.
    BadPayloadType,
    /// CSRC count above the 4-bit field's range (15).
    TooManyCsrcs,
    /// Constructed packet would exceed the caller's configured maximum
    /// packet size.
    PacketTooLarge,
    /// A compound RTCP packet did not start with SR or RR, its constituent
    /// lengths did not sum to the transport payload length, or padding was
    /// set on a packet other than the last.
    BadCompound,
    /// A constituent RTCP packet was malformed.
    BadConstituent(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Truncated => write!(f, "packet shorter than its fixed header"),
            Error::BadVersion => write!(f, "unsupported RTP/RTCP version"),
            Error::BadPadding => write!(f, "invalid padding count"),
            Error::Overflow => write!(f, "declared fields overrun the packet length"),
            Error::AmbiguousRtpRtcp => write!(f, "marker bit set on an RTCP-aliasing payload type"),
            Error::BadPayloadType => write!(f, "payload type out of range"),
            Error::TooManyCsrcs => write!(f, "CSRC count exceeds 15"),
            Error::PacketTooLarge => write!(f, "packet exceeds configured maximum size"),
            Error::BadCompound => write!(f, "malformed compound RTCP packet"),
            Error::BadConstituent(what) => write!(f, "malformed RTCP constituent: {what}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
