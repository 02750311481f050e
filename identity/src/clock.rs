//! Wall-clock access that works in both the server and the browser.

/// Current Unix time in seconds.
#[must_use]
pub fn now_unix() -> i64 {
    now_millis() / 1000
}

/// Current Unix time in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    #[cfg(target_arch = "wasm32")]
    {
        #[allow(clippy::cast_possible_truncation)]
        let ms = js_sys::Date::now() as i64;
        ms
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
        i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
    }
}
