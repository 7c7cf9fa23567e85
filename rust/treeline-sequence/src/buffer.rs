//! A growable byte vector with 16-byte-aligned storage.

/// Growable byte buffer whose backing storage is always 16-byte aligned,
/// so reinterpreting it as any primitive slice is valid.
///
/// Storage is a `Vec<u128>` managed word-wise; `len` tracks the byte length
/// independently of the word count.
#[derive(Clone, Default)]
pub struct AlignedByteVec {
    words: Vec<u128>,
    len: usize,
}

const WORD: usize = std::mem::size_of::<u128>();

impl AlignedByteVec {
    pub fn new() -> AlignedByteVec {
        AlignedByteVec::default()
    }

    pub fn with_capacity(capacity: usize) -> AlignedByteVec {
        AlignedByteVec {
            words: Vec::with_capacity(capacity.div_ceil(WORD)),
            len: 0,
        }
    }

    /// Creates a buffer of `len` zero bytes.
    pub fn zeroed(len: usize) -> AlignedByteVec {
        AlignedByteVec {
            words: vec![0u128; len.div_ceil(WORD)],
            len,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.len]
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.words)[..self.len]
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        let new_len = self.len + bytes.len();
        self.grow_words(new_len);
        bytemuck::cast_slice_mut::<u128, u8>(&mut self.words)[self.len..new_len]
            .copy_from_slice(bytes);
        self.len = new_len;
    }

    /// Appends the byte representation of a single value.
    #[inline]
    pub fn push_typed<T: bytemuck::NoUninit>(&mut self, value: T) {
        self.extend_from_slice(bytemuck::bytes_of(&value));
    }

    pub fn resize(&mut self, new_len: usize, value: u8) {
        if new_len <= self.len {
            self.len = new_len;
            return;
        }
        let old_len = self.len;
        self.grow_words(new_len);
        bytemuck::cast_slice_mut::<u128, u8>(&mut self.words)[old_len..new_len].fill(value);
        self.len = new_len;
    }

    /// Reinterprets the complete prefix of whole `T` values.
    ///
    /// The byte length must be a multiple of `size_of::<T>()`.
    #[inline]
    pub fn typed_data<T: bytemuck::AnyBitPattern>(&self) -> &[T] {
        let size = std::mem::size_of::<T>();
        assert_eq!(self.len % size, 0, "byte length not a multiple of value size");
        bytemuck::cast_slice(&self.as_slice()[..self.len])
    }

    fn grow_words(&mut self, byte_len: usize) {
        let needed = byte_len.div_ceil(WORD);
        if needed > self.words.len() {
            self.words.resize(needed.max(self.words.len() * 2), 0);
        }
    }
}

impl std::fmt::Debug for AlignedByteVec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedByteVec")
            .field("len", &self.len)
            .finish()
    }
}

impl std::ops::Deref for AlignedByteVec {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_is_aligned() {
        let mut buf = AlignedByteVec::new();
        buf.extend_from_slice(&[1u8; 48]);
        assert_eq!(buf.as_slice().as_ptr() as usize % 16, 0);
        assert_eq!(buf.len(), 48);
    }

    #[test]
    fn typed_data_round_trips() {
        let mut buf = AlignedByteVec::new();
        for i in 0..100i64 {
            buf.push_typed(i * 3);
        }
        let values = buf.typed_data::<i64>();
        assert_eq!(values.len(), 100);
        assert_eq!(values[33], 99);
    }

    #[test]
    fn resize_fills_and_truncates() {
        let mut buf = AlignedByteVec::zeroed(4);
        buf.resize(10, 0xab);
        assert_eq!(&buf.as_slice()[..5], &[0, 0, 0, 0, 0xab]);
        buf.resize(2, 0);
        assert_eq!(buf.len(), 2);
    }
}
