use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// Hard cap on string length, matching the 32-bit size field of the wire
/// format. Offsets at or past this are illegal string offsets.
pub const MAX_SIZE: i64 = i32::MAX as i64;

#[derive(Clone)]
struct StrInner {
    bytes: Vec<u8>,
    is_static: bool,
}

/// A refcounted byte string. Strings are immutable when shared; the member
/// core mutates a buffer in place only when it holds the sole reference.
///
/// Static strings (the empty string and the 256 one-byte strings) live in a
/// process-global cache, so they always report multiple references and are
/// never mutated in place.
#[derive(Clone)]
pub struct StrData {
    inner: Arc<StrInner>,
}

static EMPTY: OnceLock<StrData> = OnceLock::new();
static CHARS: OnceLock<Vec<StrData>> = OnceLock::new();

/// The interned empty string.
pub fn static_empty_string() -> StrData {
    EMPTY
        .get_or_init(|| StrData {
            inner: Arc::new(StrInner {
                bytes: Vec::new(),
                is_static: true,
            }),
        })
        .clone()
}

/// The interned one-byte string for `b`.
pub fn static_char(b: u8) -> StrData {
    let table = CHARS.get_or_init(|| {
        (0u8..=255)
            .map(|c| StrData {
                inner: Arc::new(StrInner {
                    bytes: vec![c],
                    is_static: true,
                }),
            })
            .collect()
    });
    table[b as usize].clone()
}

impl StrData {
    pub fn from_bytes(bytes: Vec<u8>) -> StrData {
        StrData {
            inner: Arc::new(StrInner {
                bytes,
                is_static: false,
            }),
        }
    }

    pub fn from_str(s: &str) -> StrData {
        StrData::from_bytes(s.as_bytes().to_vec())
    }

    pub fn size(&self) -> usize {
        self.inner.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.bytes.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.inner.bytes
    }

    pub fn is_static(&self) -> bool {
        self.inner.is_static
    }

    /// True when more than one handle refers to this buffer. Static strings
    /// are pinned by the global cache and always report true.
    pub fn has_multiple_refs(&self) -> bool {
        Arc::strong_count(&self.inner) > 1
    }

    /// The interned one-byte string for position `i`. Caller must check
    /// bounds first.
    pub fn get_char(&self, i: usize) -> StrData {
        static_char(self.inner.bytes[i])
    }

    /// Overwrite one byte in place. Only legal when the caller holds the
    /// sole reference (`!has_multiple_refs()`).
    pub fn set_byte(&mut self, i: usize, b: u8) {
        debug_assert!(!self.inner.is_static);
        Arc::make_mut(&mut self.inner).bytes[i] = b;
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.inner.bytes).into_owned()
    }

    /// Parse the contents as a canonical decimal integer key: optional `-`,
    /// digits only, no whitespace, no leading zero (`"0"` itself is fine),
    /// no `-0`, and the value fits in an i64. Anything else is a plain
    /// string key.
    pub fn strictly_integer(&self) -> Option<i64> {
        let bytes = &self.inner.bytes;
        if bytes.is_empty() {
            return None;
        }
        let (neg, digits) = if bytes[0] == b'-' {
            (true, &bytes[1..])
        } else {
            (false, &bytes[..])
        };
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
        if digits.len() > 1 && digits[0] == b'0' {
            return None;
        }
        if neg && digits == b"0" {
            return None;
        }
        let mut n: i64 = 0;
        for &d in digits {
            n = n.checked_mul(10)?;
            let digit = (d - b'0') as i64;
            n = if neg {
                n.checked_sub(digit)?
            } else {
                n.checked_add(digit)?
            };
        }
        Some(n)
    }

    /// strtol-style base-10 integer cast: skip leading whitespace, optional
    /// sign, then consume digits; a non-numeric prefix yields 0. Overflow
    /// saturates.
    pub fn to_int64(&self) -> i64 {
        let bytes = &self.inner.bytes;
        let mut i = 0;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let neg = if i < bytes.len() && (bytes[i] == b'-' || bytes[i] == b'+') {
            let neg = bytes[i] == b'-';
            i += 1;
            neg
        } else {
            false
        };
        let mut n: i64 = 0;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            let digit = (bytes[i] - b'0') as i64;
            n = match n.checked_mul(10).and_then(|n| {
                if neg {
                    n.checked_sub(digit)
                } else {
                    n.checked_add(digit)
                }
            }) {
                Some(n) => n,
                None => return if neg { i64::MIN } else { i64::MAX },
            };
            i += 1;
        }
        n
    }

    /// Leading-numeric-prefix parse used by arithmetic coercion: an
    /// integral prefix yields an i64, a fractional or exponent prefix
    /// yields an f64, anything else yields int 0.
    pub fn to_number(&self) -> crate::cell::Num {
        use crate::cell::Num;
        let s = self.to_string_lossy();
        let t = s.trim_start();
        let mut end = 0;
        let bytes = t.as_bytes();
        if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
            end += 1;
        }
        let int_start = end;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        let mut float = false;
        if end < bytes.len() && bytes[end] == b'.' {
            let mut j = end + 1;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j > end + 1 || end > int_start {
                float = true;
                end = j;
            }
        }
        if end > int_start
            && end < bytes.len()
            && (bytes[end] == b'e' || bytes[end] == b'E')
        {
            let mut j = end + 1;
            if j < bytes.len() && (bytes[j] == b'-' || bytes[j] == b'+') {
                j += 1;
            }
            let exp_start = j;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j > exp_start {
                float = true;
                end = j;
            }
        }
        if end == int_start {
            return Num::Int(0);
        }
        let prefix = &t[..end];
        if float {
            Num::Dbl(prefix.parse::<f64>().unwrap_or(0.0))
        } else {
            match prefix.parse::<i64>() {
                Ok(n) => Num::Int(n),
                Err(_) => Num::Dbl(prefix.parse::<f64>().unwrap_or(0.0)),
            }
        }
    }
}

impl PartialEq for StrData {
    fn eq(&self, other: &Self) -> bool {
        self.inner.bytes == other.inner.bytes
    }
}

impl Eq for StrData {}

impl Hash for StrData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.bytes.hash(state);
    }
}

impl fmt::Display for StrData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for StrData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}
