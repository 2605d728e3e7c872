/// Convert a 64-bit length decoded from a stream into an in-memory byte count.
///
/// In practice, this is useful for turning a declared payload length into a
/// count of bytes to consume. On 64-bit targets the conversion never fails;
/// on smaller targets a length that cannot fit in `usize` could not describe
/// in-memory data anyway, and `None` is returned.
#[inline]
pub fn u64_to_usize(num: u64) -> Option<usize> {
    usize::try_from(num).ok()
}
