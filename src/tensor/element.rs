/// Fixed-width scalar that can live in tensor storage and in a page file.
///
/// Page files hold elements back to back in little-endian order, `SIZE`
/// bytes each.
pub trait Element: Copy + Default + PartialEq + std::fmt::Debug + 'static {
    const SIZE: usize;
    fn write_le(self, out: &mut [u8]);
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut b = [0u8; std::mem::size_of::<$t>()];
                    b.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_le_bytes(b)
                }
            }
        )*
    };
}

impl_element!(i8, u8, i16, i32, f32);

/// Encode a run of elements into a contiguous little-endian byte buffer.
pub fn encode_slice<T: Element>(src: &[T]) -> Vec<u8> {
    let mut out = vec![0u8; src.len() * T::SIZE];
    for (v, chunk) in src.iter().zip(out.chunks_exact_mut(T::SIZE)) {
        v.write_le(chunk);
    }
    out
}

/// Decode `dst.len()` elements from `bytes`; `bytes` must hold at least that many.
pub fn decode_into<T: Element>(bytes: &[u8], dst: &mut [T]) {
    for (slot, chunk) in dst.iter_mut().zip(bytes.chunks_exact(T::SIZE)) {
        *slot = T::read_le(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i32_little_endian_layout() {
        let bytes = encode_slice(&[1i32, -2]);
        assert_eq!(bytes, vec![1, 0, 0, 0, 0xfe, 0xff, 0xff, 0xff]);
        let mut back = [0i32; 2];
        decode_into(&bytes, &mut back);
        assert_eq!(back, [1, -2]);
    }

    #[test]
    fn i8_is_one_byte() {
        assert_eq!(<i8 as Element>::SIZE, 1);
        assert_eq!(encode_slice(&[-1i8, 127]), vec![0xff, 0x7f]);
    }
}
