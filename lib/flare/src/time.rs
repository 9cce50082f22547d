use std::time::SystemTime;

/// Whole seconds of unix time.
#[inline]
pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("System clock is set before the unix epoch")
        .as_secs()
}

/// Millisecond wall clock truncated to 32 bits, used for wire timestamps
/// where only differences matter.
#[inline]
pub fn timestamp_millis() -> u32 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("System clock is set before the unix epoch")
        .as_millis() as u32
}
