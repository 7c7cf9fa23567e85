//! A collection of values stored as bytes with alignment guarantees.

use crate::buffer::AlignedByteVec;

/// Typed view over an aligned byte buffer.
///
/// `Values` does not remember its element type; callers supply it at each
/// access, which keeps one buffer type serving every decoded column.
#[derive(Debug, Clone, Default)]
pub struct Values(AlignedByteVec);

impl Values {
    pub fn new() -> Values {
        Values(AlignedByteVec::new())
    }

    pub fn from_buffer(buf: AlignedByteVec) -> Values {
        Values(buf)
    }

    /// Space for `capacity` elements of type `T`, no elements yet.
    pub fn with_capacity<T>(capacity: usize) -> Values {
        Values(AlignedByteVec::with_capacity(
            capacity * std::mem::size_of::<T>(),
        ))
    }

    /// `len` zeroed elements of type `T`.
    pub fn zeroed<T: bytemuck::Zeroable>(len: usize) -> Values {
        Values(AlignedByteVec::zeroed(len * std::mem::size_of::<T>()))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of complete elements of type `T` in the buffer.
    #[inline]
    pub fn len<T>(&self) -> usize {
        self.0.len() / std::mem::size_of::<T>()
    }

    #[inline]
    pub fn bytes_len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    #[inline]
    pub fn as_slice<T: bytemuck::AnyBitPattern>(&self) -> &[T] {
        self.0.typed_data()
    }

    #[inline]
    pub fn push<T: bytemuck::NoUninit>(&mut self, value: T) {
        self.0.push_typed(value);
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    pub fn extend_from_values(&mut self, other: &Values) {
        self.0.extend_from_slice(other.as_bytes());
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_read_typed() {
        let mut values = Values::with_capacity::<f64>(4);
        values.push(1.5f64);
        values.push(-2.5f64);
        assert_eq!(values.len::<f64>(), 2);
        assert_eq!(values.as_slice::<f64>(), &[1.5, -2.5]);
        assert_eq!(values.bytes_len(), 16);
    }

    #[test]
    fn extend_concatenates_bytewise() {
        let mut a = Values::new();
        a.push(7i32);
        let mut b = Values::new();
        b.push(8i32);
        b.push(9i32);
        a.extend_from_values(&b);
        assert_eq!(a.as_slice::<i32>(), &[7, 8, 9]);
    }
}
