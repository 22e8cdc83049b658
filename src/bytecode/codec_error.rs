use crate::bytecode::verify::VerifyError;

/// Errors produced while reading or writing the binary bytecode format.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("bad magic: expected \"SMOG\", found {found:02x?}")]
    InvalidMagic { found: [u8; 4] },

    #[error("unsupported version {found} (this build reads version {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("unsupported flags {0:#010x}")]
    UnsupportedFlags(u32),

    #[error("truncated input at byte {offset}: need {needed} more byte(s) for {context}")]
    Truncated {
        offset: usize,
        needed: usize,
        context: &'static str,
    },

    #[error("unknown opcode {byte:#04x} at byte {offset}")]
    UnknownOpcode { byte: u8, offset: usize },

    #[error("unknown constant tag {tag} at byte {offset}")]
    UnknownConstantTag { tag: u8, offset: usize },

    #[error("invalid UTF-8 in string at byte {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("{count} trailing byte(s) after unit ending at byte {offset}")]
    TrailingBytes { offset: usize, count: usize },

    #[error("nesting deeper than {limit} levels at byte {offset}")]
    NestingTooDeep { limit: usize, offset: usize },

    #[error("{what} too large to encode ({len} entries)")]
    TooLarge { what: &'static str, len: usize },

    #[error("decoded bytecode is invalid: {0}")]
    Invalid(#[from] VerifyError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
