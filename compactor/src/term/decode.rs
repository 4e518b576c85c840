//! Term decoder.

use bytes::Buf;

use crate::term::{TermError, tags};

/// Deepest tuple or list nesting `raw_term` will walk. Keys and values written
/// by this crate nest at most two levels.
pub const MAX_NESTING: usize = 64;

/// Forward-only cursor over an encoded term.
///
/// Each typed read checks the tag at the cursor and fails with
/// `TermError::UnexpectedTag` when it is not the requested type.
#[derive(Debug)]
pub struct TermReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> TermReader<'a> {
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current byte offset into the input.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Fail unless the whole input has been consumed.
    pub const fn finish(&self) -> Result<(), TermError> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(TermError::TrailingBytes {
                remaining: self.buf.len() - self.pos,
            })
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], TermError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(TermError::UnexpectedEnd { offset: self.pos })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, TermError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, TermError> {
        Ok(self.take(2)?.get_u16())
    }

    fn u32(&mut self) -> Result<u32, TermError> {
        Ok(self.take(4)?.get_u32())
    }

    fn peek_tag(&self) -> Result<u8, TermError> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or(TermError::UnexpectedEnd { offset: self.pos })
    }

    fn unexpected(&self, expected: &'static str, found: u8) -> TermError {
        TermError::UnexpectedTag {
            offset: self.pos,
            expected,
            found,
        }
    }

    /// Consume the leading version byte.
    pub fn version(&mut self) -> Result<(), TermError> {
        match self.u8()? {
            tags::VERSION => Ok(()),
            other => Err(TermError::BadVersion(other)),
        }
    }

    /// Read a tuple header and return its arity.
    pub fn tuple_header(&mut self) -> Result<usize, TermError> {
        match self.peek_tag()? {
            tags::SMALL_TUPLE => {
                self.pos += 1;
                Ok(usize::from(self.u8()?))
            }
            tags::LARGE_TUPLE => {
                self.pos += 1;
                Ok(self.u32()? as usize)
            }
            other => Err(self.unexpected("tuple", other)),
        }
    }

    /// Read a tuple header and require a specific arity.
    pub fn tuple_of(&mut self, arity: usize) -> Result<(), TermError> {
        let offset = self.pos;
        let found = self.tuple_header()?;
        if found == arity {
            Ok(())
        } else {
            Err(TermError::UnexpectedTag {
                offset,
                expected: "tuple of different arity",
                found: u8::try_from(found).unwrap_or(u8::MAX),
            })
        }
    }

    /// Read a list header and return its length. Nil reads as an empty list.
    pub fn list_header(&mut self) -> Result<usize, TermError> {
        match self.peek_tag()? {
            tags::NIL => {
                self.pos += 1;
                Ok(0)
            }
            tags::LIST => {
                self.pos += 1;
                Ok(self.u32()? as usize)
            }
            other => Err(self.unexpected("list", other)),
        }
    }

    /// Read the nil that terminates a proper list.
    pub fn nil(&mut self) -> Result<(), TermError> {
        let offset = self.pos;
        match self.u8()? {
            tags::NIL => Ok(()),
            _ => Err(TermError::ImproperList { offset }),
        }
    }

    /// Read an atom's text.
    pub fn atom(&mut self) -> Result<&'a str, TermError> {
        let tag = self.peek_tag()?;
        if tag != tags::ATOM {
            return Err(self.unexpected("atom", tag));
        }
        self.pos += 1;
        let offset = self.pos;
        let len = usize::from(self.u16()?);
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes).map_err(|_| TermError::InvalidAtom { offset })
    }

    /// Read a non-negative integer.
    pub fn u64(&mut self) -> Result<u64, TermError> {
        let offset = self.pos;
        match self.peek_tag()? {
            tags::SMALL_INTEGER => {
                self.pos += 1;
                Ok(u64::from(self.u8()?))
            }
            tags::INTEGER => {
                self.pos += 1;
                let value = self.take(4)?.get_i32();
                u64::try_from(value).map_err(|_| TermError::NegativeInteger { offset })
            }
            tags::SMALL_BIG => {
                self.pos += 1;
                let count = usize::from(self.u8()?);
                let sign = self.u8()?;
                let digits = self.take(count)?;
                if sign != 0 {
                    return Err(TermError::NegativeInteger { offset });
                }
                if count > 8 {
                    return Err(TermError::IntegerOverflow { offset });
                }
                let mut le = [0u8; 8];
                le[..count].copy_from_slice(digits);
                Ok(u64::from_le_bytes(le))
            }
            other => Err(self.unexpected("integer", other)),
        }
    }

    /// Read a binary's contents.
    pub fn binary(&mut self) -> Result<&'a [u8], TermError> {
        let tag = self.peek_tag()?;
        if tag != tags::BINARY {
            return Err(self.unexpected("binary", tag));
        }
        self.pos += 1;
        let len = self.u32()? as usize;
        self.take(len)
    }

    /// Skip one complete term and return its encoded bytes.
    ///
    /// Fails with `TermError::TooDeep` rather than recursing past
    /// `MAX_NESTING` levels.
    pub fn raw_term(&mut self) -> Result<&'a [u8], TermError> {
        let start = self.pos;
        self.skip(0)?;
        Ok(&self.buf[start..self.pos])
    }

    fn skip(&mut self, depth: usize) -> Result<(), TermError> {
        match self.peek_tag()? {
            tags::SMALL_INTEGER | tags::INTEGER | tags::SMALL_BIG => {
                self.u64()?;
            }
            tags::ATOM => {
                self.atom()?;
            }
            tags::BINARY => {
                self.binary()?;
            }
            tags::SMALL_TUPLE | tags::LARGE_TUPLE => {
                let offset = self.pos;
                let arity = self.tuple_header()?;
                if arity > 0 && depth >= MAX_NESTING {
                    return Err(TermError::TooDeep { offset });
                }
                for _ in 0..arity {
                    self.skip(depth + 1)?;
                }
            }
            tags::NIL | tags::LIST => {
                let offset = self.pos;
                let len = self.list_header()?;
                if len > 0 {
                    if depth >= MAX_NESTING {
                        return Err(TermError::TooDeep { offset });
                    }
                    for _ in 0..len {
                        self.skip(depth + 1)?;
                    }
                    self.nil()?;
                }
            }
            other => return Err(self.unexpected("term", other)),
        }
        Ok(())
    }
}
