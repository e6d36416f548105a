pub const MAX_INPUT_SIZE: usize = 256 * 1024;

/// `data` capped to `MAX_INPUT_SIZE` to avoid OOM on pathological inputs.
#[inline]
pub fn truncate(data: &[u8]) -> &[u8] {
    &data[..data.len().min(MAX_INPUT_SIZE)]
}
