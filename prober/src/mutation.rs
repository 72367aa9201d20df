//! Byte level edits which fault injectors apply to exactly one buffer.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteEdit {
    Replace(u8),
    Xor(u8),
}

impl ByteEdit {
    fn apply(self, byte: u8) -> u8 {
        match self {
            ByteEdit::Replace(value) => value,
            ByteEdit::Xor(mask) => byte ^ mask,
        }
    }
}

/// Offsets to edits. Negative offsets count from the end of the buffer, -1 being the last byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationSpec {
    edits: BTreeMap<isize, ByteEdit>,
}

impl MutationSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mutation out of separate substitution and xor tables.
    ///
    /// Substitutions are applied before xors, so an offset present in both ends up as
    /// `substitution ^ xor`.
    pub fn from_tables<S, X>(substitutions: S, xors: X) -> Self
    where
        S: IntoIterator<Item = (isize, u8)>,
        X: IntoIterator<Item = (isize, u8)>,
    {
        let mut spec = Self::new();
        for (offset, value) in substitutions {
            spec = spec.substitute(offset, value);
        }
        for (offset, mask) in xors {
            spec = spec.xor(offset, mask);
        }
        spec
    }

    pub fn substitute(mut self, offset: isize, value: u8) -> Self {
        self.edits.insert(offset, ByteEdit::Replace(value));
        self
    }

    pub fn xor(mut self, offset: isize, mask: u8) -> Self {
        let edit = match self.edits.get(&offset) {
            Some(ByteEdit::Replace(value)) => ByteEdit::Replace(value ^ mask),
            Some(ByteEdit::Xor(previous)) => ByteEdit::Xor(previous ^ mask),
            None => ByteEdit::Xor(mask),
        };
        self.edits.insert(offset, edit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn edits(&self) -> impl Iterator<Item = (isize, ByteEdit)> + '_ {
        self.edits.iter().map(|(offset, edit)| (*offset, *edit))
    }

    /// Applies all edits in place. Fails without touching `data` if an offset does not exist.
    ///
    /// A positive and a negative offset may name the same byte, so substitutions go first once
    /// both are resolved against the buffer.
    pub fn apply(&self, data: &mut [u8]) -> Result<(), Error> {
        let mut positions = self
            .edits
            .iter()
            .map(|(offset, edit)| {
                resolve(*offset, data.len())
                    .map(|index| (index, *edit))
                    .ok_or_else(|| {
                        Error::Codec(format!(
                            "mutation offset {} is outside of a {} byte buffer",
                            offset,
                            data.len()
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        positions.sort_by_key(|(_, edit)| matches!(edit, ByteEdit::Xor(_)));

        for (index, edit) in positions {
            data[index] = edit.apply(data[index]);
        }
        Ok(())
    }

    pub fn applied(&self, mut data: Vec<u8>) -> Result<Vec<u8>, Error> {
        self.apply(&mut data)?;
        Ok(data)
    }
}

impl fmt::Display for MutationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        write!(f, "{{")?;
        for (offset, edit) in &self.edits {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            match edit {
                ByteEdit::Replace(value) => write!(f, "{}: ={:#04x}", offset, value)?,
                ByteEdit::Xor(mask) => write!(f, "{}: ^{:#04x}", offset, mask)?,
            }
        }
        write!(f, "}}")
    }
}

/// Maps a possibly negative offset to an index into a buffer of `len` bytes.
pub fn resolve(offset: isize, len: usize) -> Option<usize> {
    let index = if offset < 0 {
        len.checked_sub(offset.unsigned_abs())?
    } else {
        offset as usize
    };
    (index < len).then_some(index)
}

/// Every single bit flip of the last `n` bytes, as `(offset, mask)` pairs.
pub fn trailing_bit_flips(n: usize) -> impl Iterator<Item = (isize, u8)> {
    (1..=n as isize).rev().flat_map(|back| (0..8).map(move |bit| (-back, 1u8 << bit)))
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_empty_spec_is_identity() {
        let data = vec![1u8, 2, 3, 4];
        assert_eq!(MutationSpec::new().applied(data.clone()).unwrap(), data);
        // even an empty buffer
        assert_eq!(MutationSpec::new().applied(vec![]).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_negative_offsets() {
        let spec = MutationSpec::new().substitute(-1, 0xff).xor(0, 0x01);
        assert_eq!(spec.applied(vec![0x10, 0x20, 0x30]).unwrap(), vec![0x11, 0x20, 0xff]);
    }

    #[test]
    fn test_substitution_before_xor() {
        let spec = MutationSpec::from_tables([(1, 0xf0)], [(1, 0x0f), (-1, 0x01), (-1, 0x01)]);
        assert_eq!(spec.applied(vec![0, 0, 7]).unwrap(), vec![0, 0xff, 7]);
    }

    #[test]
    fn test_substitution_before_xor_across_offset_signs() {
        let spec = MutationSpec::from_tables([(1, 0xf0)], [(-2, 0x0f)]);
        assert_eq!(spec.applied(vec![0, 0, 0]).unwrap(), vec![0, 0xff, 0]);
        let spec = MutationSpec::from_tables([(-2, 0xf0)], [(1, 0x0f)]);
        assert_eq!(spec.applied(vec![0, 0, 0]).unwrap(), vec![0, 0xff, 0]);
    }

    #[test]
    fn test_out_of_range_leaves_data_untouched() {
        let spec = MutationSpec::new().xor(0, 0xff).xor(-4, 0x01);
        let mut data = vec![1u8, 2, 3];
        assert!(matches!(spec.apply(&mut data), Err(Error::Codec(_))));
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn test_resolve() {
        assert_eq!(resolve(-1, 4), Some(3));
        assert_eq!(resolve(-4, 4), Some(0));
        assert_eq!(resolve(-5, 4), None);
        assert_eq!(resolve(4, 4), None);
        assert_eq!(resolve(0, 0), None);
    }

    #[test]
    fn test_trailing_bit_flips() {
        let flips: Vec<_> = trailing_bit_flips(2).collect();
        assert_eq!(flips.len(), 16);
        assert_eq!(flips[0], (-2, 0x01));
        assert_eq!(flips[15], (-1, 0x80));
    }

    #[test]
    fn test_display() {
        let spec = MutationSpec::new().substitute(-1, 0).xor(2, 0x80);
        assert_eq!(spec.to_string(), "{-1: =0x00, 2: ^0x80}");
    }
}
