use core::fmt;

/// Errors surfaced by the packet codec and RailCom codec.
///
/// These are value-level failures only: none of them ever cross an
/// interrupt boundary, and none of them affect an in-progress transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// An address, speed, CV number, CV value, function, or bit index was
    /// outside its valid range.
    InvalidArgument,
    /// The XOR checksum did not match.
    BadXor,
    /// The leading bytes did not match any known packet type.
    UnknownType,
    /// Fewer bytes were available than the packet type requires.
    TruncatedPacket,
    /// A RailCom channel could not be parsed; it is discarded, not repaired.
    RailComCorrupt,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Error::InvalidArgument => "dcc: invalid argument",
            Error::BadXor => "dcc: bad xor checksum",
            Error::UnknownType => "dcc: unknown packet type",
            Error::TruncatedPacket => "dcc: truncated packet",
            Error::RailComCorrupt => "dcc: corrupt railcom data",
        };
        f.write_str(s)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
