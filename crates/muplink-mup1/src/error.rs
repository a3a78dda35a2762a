/// Errors that can occur during MUP1 frame encoding/decoding.
///
/// None of these are fatal to a connection: the deframer drops the
/// offending bytes and resynchronizes on the next start-of-frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than the smallest possible frame.
    #[error("frame too short ({len} bytes, minimum 8)")]
    FrameTooShort { len: usize },

    /// The first byte is not the start-of-frame marker `>`.
    #[error("bad start-of-frame byte 0x{byte:02X} (expected 0x3E '>')")]
    BadSof { byte: u8 },

    /// The type byte is not one of the five MUP1 command bytes.
    #[error("unknown frame type byte 0x{byte:02X}")]
    BadType { byte: u8 },

    /// No unescaped end-of-frame marker before the input ran out.
    #[error("no end-of-frame marker found")]
    MissingEof,

    /// The trailing hex characters do not match the computed checksum.
    #[error("frame checksum mismatch")]
    ChecksumMismatch,

    /// The deframer scratch buffer grew past its cap without completing a
    /// frame; accumulated bytes were discarded.
    #[error("deframer buffer overflow ({dropped} bytes discarded)")]
    BufferOverflow { dropped: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
