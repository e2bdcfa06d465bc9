use std::fmt::{self, Debug, Display};

/// A single header value. Values are stored byte-exact; the string
/// accessors only succeed for utf-8 content.
#[derive(Clone, Eq, PartialEq)]
pub struct HeaderValue(Vec<u8>);

impl HeaderValue {
    /// the value as a `&str`, if it is utf-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// is this value free of bytes that would corrupt a header block?
    pub fn is_valid(&self) -> bool {
        !self.0.iter().any(|b| matches!(b, b'\r' | b'\n' | 0))
    }

    /// the raw bytes of this value
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for HeaderValue {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for HeaderValue {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for HeaderValue {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<u64> for HeaderValue {
    fn from(value: u64) -> Self {
        Self(value.to_string().into_bytes())
    }
}

impl From<usize> for HeaderValue {
    fn from(value: usize) -> Self {
        Self(value.to_string().into_bytes())
    }
}

impl Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl Debug for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => Debug::fmt(s, f),
            None => write!(f, "{:?}", &self.0),
        }
    }
}

impl PartialEq<&str> for HeaderValue {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}
