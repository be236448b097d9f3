use bytes::{BufMut, Bytes, BytesMut};

/// Join byte slices into one contiguous buffer with a single allocation.
pub fn concat_chunks<B: AsRef<[u8]>>(chunks: &[B]) -> Bytes {
    let total = chunks.iter().map(|c| c.as_ref().len()).sum();
    let mut out = BytesMut::with_capacity(total);
    for chunk in chunks {
        out.put_slice(chunk.as_ref());
    }
    out.freeze()
}
