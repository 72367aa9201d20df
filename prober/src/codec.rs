//! Minimal big-endian wire codec shared by protocol bindings.

use std::fmt::Debug;

/// Cursor over a byte slice which is consumed from the front.
pub struct Reader<'a> {
    buf: &'a [u8],
    offs: usize,
}

impl<'a> Reader<'a> {
    pub fn init(bytes: &'a [u8]) -> Reader<'a> {
        Reader {
            buf: bytes,
            offs: 0,
        }
    }

    /// Consumes everything which is left.
    pub fn rest(&mut self) -> &'a [u8] {
        let ret = &self.buf[self.offs..];
        self.offs = self.buf.len();
        ret
    }

    pub fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.peek(len)?;
        self.offs += len;
        Some(bytes)
    }

    pub fn peek(&self, len: usize) -> Option<&'a [u8]> {
        if self.left() < len {
            return None;
        }
        Some(&self.buf[self.offs..self.offs + len])
    }

    pub fn any_left(&self) -> bool {
        self.offs < self.buf.len()
    }

    pub fn left(&self) -> usize {
        self.buf.len() - self.offs
    }

    pub fn used(&self) -> usize {
        self.offs
    }

    /// Splits off the next `len` bytes as an independent reader.
    pub fn sub(&mut self, len: usize) -> Option<Reader<'a>> {
        self.take(len).map(Reader::init)
    }
}

/// Things we can encode and read from a [`Reader`].
pub trait Codec: Debug + Sized {
    /// Encode yourself by appending onto `bytes`.
    fn encode(&self, bytes: &mut Vec<u8>);

    /// Decode yourself by fiddling with the `Reader`.
    /// Return Some if it worked, None if not.
    fn read(r: &mut Reader) -> Option<Self>;

    fn get_encoding(&self) -> Vec<u8> {
        let mut ret = Vec::new();
        self.encode(&mut ret);
        ret
    }

    /// Reads one value and requires that it spans all of `bytes`.
    fn read_bytes(bytes: &[u8]) -> Option<Self> {
        let mut rd = Reader::init(bytes);
        let value = Self::read(&mut rd)?;
        if rd.any_left() {
            return None;
        }
        Some(value)
    }
}

impl Codec for u8 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.push(*self);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        r.take(1).map(|b| b[0])
    }
}

impl Codec for u16 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.to_be_bytes());
    }

    fn read(r: &mut Reader) -> Option<Self> {
        Some(u16::from_be_bytes(r.take(2)?.try_into().ok()?))
    }
}

/// Three byte integer as used by handshake headers and certificate lists.
#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct u24(pub u32);

impl Codec for u24 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.0.to_be_bytes()[1..]);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let b = r.take(3)?;
        Some(u24(u32::from_be_bytes([0, b[0], b[1], b[2]])))
    }
}

impl From<u24> for usize {
    fn from(v: u24) -> Self {
        v.0 as usize
    }
}

impl Codec for u32 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.to_be_bytes());
    }

    fn read(r: &mut Reader) -> Option<Self> {
        Some(u32::from_be_bytes(r.take(4)?.try_into().ok()?))
    }
}

impl Codec for u64 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.to_be_bytes());
    }

    fn read(r: &mut Reader) -> Option<Self> {
        Some(u64::from_be_bytes(r.take(8)?.try_into().ok()?))
    }
}

/// Writes a big-endian length prefix of `width` bytes in front of whatever `body` appends.
/// Lengths which do not fit are saturated, which is what a fault injector wants.
pub fn encode_prefixed<F>(bytes: &mut Vec<u8>, width: usize, body: F)
where
    F: FnOnce(&mut Vec<u8>),
{
    let len_offset = bytes.len();
    bytes.resize(len_offset + width, 0);
    body(bytes);

    let len = bytes.len() - len_offset - width;
    let max = (1usize << (8 * width)) - 1;
    let len_bytes = (len.min(max) as u64).to_be_bytes();
    bytes[len_offset..len_offset + width].copy_from_slice(&len_bytes[8 - width..]);
}

pub fn encode_vec_u8<T: Codec>(bytes: &mut Vec<u8>, items: &[T]) {
    encode_prefixed(bytes, 1, |out| items.iter().for_each(|i| i.encode(out)));
}

pub fn encode_vec_u16<T: Codec>(bytes: &mut Vec<u8>, items: &[T]) {
    encode_prefixed(bytes, 2, |out| items.iter().for_each(|i| i.encode(out)));
}

pub fn encode_vec_u24<T: Codec>(bytes: &mut Vec<u8>, items: &[T]) {
    encode_prefixed(bytes, 3, |out| items.iter().for_each(|i| i.encode(out)));
}

fn read_items<T: Codec>(mut sub: Reader) -> Option<Vec<T>> {
    let mut ret = Vec::new();
    while sub.any_left() {
        ret.push(T::read(&mut sub)?);
    }
    Some(ret)
}

pub fn read_vec_u8<T: Codec>(r: &mut Reader) -> Option<Vec<T>> {
    let len = usize::from(u8::read(r)?);
    read_items(r.sub(len)?)
}

pub fn read_vec_u16<T: Codec>(r: &mut Reader) -> Option<Vec<T>> {
    let len = usize::from(u16::read(r)?);
    read_items(r.sub(len)?)
}

pub fn read_vec_u24_limited<T: Codec>(r: &mut Reader, max_bytes: usize) -> Option<Vec<T>> {
    let len = usize::from(u24::read(r)?);
    if len > max_bytes {
        return None;
    }
    read_items(r.sub(len)?)
}
