//! 缓存键生成
//!
//! 只对前 1000 个字符做滚动哈希，再拼上总长度，
//! 前缀相同但长度不同的输入不会得到同一个键。

/// 参与哈希的最大字符数（UTF-16 码元）
pub const SAMPLE_LEN: usize = 1000;

/// 32 位滚动哈希：`h = h * 31 + c`，按 i32 环绕
pub fn rolling_hash(payload: &str) -> i32 {
    payload
        .encode_utf16()
        .take(SAMPLE_LEN)
        .fold(0i32, |hash, unit| {
            hash.wrapping_shl(5)
                .wrapping_sub(hash)
                .wrapping_add(i32::from(unit))
        })
}

/// 生成缓存键：`<namespace>_<hash36>_<len>`
pub fn cache_key(namespace: &str, payload: &str) -> String {
    let hash = i64::from(rolling_hash(payload)).unsigned_abs();
    let len = payload.encode_utf16().count();
    format!("{}_{}_{}", namespace, to_base36(hash), len)
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let mut buf = Vec::new();
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}
