//! Binary term codec.
//!
//! Values handed to the host engine are encoded in the Erlang external term
//! format, which is what the engine's node reader understands. Only the subset
//! needed for B-tree nodes is supported:
//!
//! ```text
//! version      131
//! small int    97  u8
//! integer      98  i32 (big-endian)
//! atom         100 u16 length, bytes
//! small tuple  104 u8 arity, elements...
//! large tuple  105 u32 arity, elements...
//! nil          106
//! list         108 u32 length, elements..., tail (nil)
//! binary       109 u32 length, bytes
//! small big    110 u8 digit count, sign, digits (little-endian)
//! ```
//!
//! The encoder is used in production; the decoder exists for the tree reader
//! and for tests that round-trip nodes.

mod decode;
mod encode;

pub use decode::{MAX_NESTING, TermReader};
pub use encode::{TermWriter, encode_binary, encode_u64};

/// Tag bytes of the external term format.
pub mod tags {
    pub const VERSION: u8 = 131;
    pub const SMALL_INTEGER: u8 = 97;
    pub const INTEGER: u8 = 98;
    pub const ATOM: u8 = 100;
    pub const SMALL_TUPLE: u8 = 104;
    pub const LARGE_TUPLE: u8 = 105;
    pub const NIL: u8 = 106;
    pub const LIST: u8 = 108;
    pub const BINARY: u8 = 109;
    pub const SMALL_BIG: u8 = 110;
}

/// Largest unsigned value the encoder writes as a 32-bit `INTEGER`.
///
/// Above this the host engine's encoder switches to a bignum, so we do too.
pub const MAX_FIXED_INTEGER: u64 = (1 << 27) - 1;

/// Errors that can occur while encoding or decoding terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermError {
    /// Input ended in the middle of a term.
    UnexpectedEnd { offset: usize },
    /// A different term type was found than the one required.
    UnexpectedTag {
        offset: usize,
        expected: &'static str,
        found: u8,
    },
    /// The leading version byte is missing or wrong.
    BadVersion(u8),
    /// Atom text is not UTF-8, or not an atom the reader accepts here.
    InvalidAtom { offset: usize },
    /// A signed integer term held a negative value.
    NegativeInteger { offset: usize },
    /// A bignum does not fit in 64 bits.
    IntegerOverflow { offset: usize },
    /// A list was not terminated by nil.
    ImproperList { offset: usize },
    /// Bytes remained after the outermost term.
    TrailingBytes { remaining: usize },
    /// A length does not fit the format's length field.
    TooLarge { len: usize },
    /// Tuples or lists nested deeper than `MAX_NESTING`.
    TooDeep { offset: usize },
}

impl std::fmt::Display for TermError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedEnd { offset } => write!(f, "unexpected end of term at byte {offset}"),
            Self::UnexpectedTag {
                offset,
                expected,
                found,
            } => write!(
                f,
                "expected {expected} at byte {offset}, found tag {found}"
            ),
            Self::BadVersion(v) => write!(f, "bad term version byte: {v}"),
            Self::InvalidAtom { offset } => write!(f, "invalid atom at byte {offset}"),
            Self::NegativeInteger { offset } => {
                write!(f, "negative integer at byte {offset}")
            }
            Self::IntegerOverflow { offset } => {
                write!(f, "integer at byte {offset} does not fit in 64 bits")
            }
            Self::ImproperList { offset } => write!(f, "improper list tail at byte {offset}"),
            Self::TrailingBytes { remaining } => {
                write!(f, "{remaining} trailing bytes after term")
            }
            Self::TooLarge { len } => write!(f, "length {len} does not fit in a term header"),
            Self::TooDeep { offset } => {
                write!(f, "term nested more than {MAX_NESTING} levels at byte {offset}")
            }
        }
    }
}

impl std::error::Error for TermError {}
