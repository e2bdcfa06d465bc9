use super::KnownHeaderName;
use std::fmt::{self, Debug, Display};

/// The name of an HTTP header. Comparison is ascii-case-insensitive;
/// names the server itself cares about are interned as
/// [`KnownHeaderName`] variants.
#[derive(Clone, Eq)]
pub struct HeaderName(pub(crate) HeaderNameInner);

#[derive(Clone, Eq, PartialEq)]
pub(crate) enum HeaderNameInner {
    Known(KnownHeaderName),
    Unknown(Box<str>),
}

pub(crate) fn is_tchar(c: u8) -> bool {
    matches!(
        c,
        b'a'..=b'z'
            | b'A'..=b'Z'
            | b'0'..=b'9'
            | b'!'
            | b'#'
            | b'$'
            | b'%'
            | b'&'
            | b'\''
            | b'*'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~'
    )
}

impl HeaderName {
    /// the name as it will appear on the wire. Known names use their
    /// canonical capitalization; unknown names are kept exactly as provided.
    pub fn as_str(&self) -> &str {
        match &self.0 {
            HeaderNameInner::Known(known) => known.as_str(),
            HeaderNameInner::Unknown(name) => name,
        }
    }

    /// is every byte of this name a legal header token character?
    pub fn is_valid(&self) -> bool {
        self.as_str().bytes().all(is_tchar)
    }
}

impl PartialEq for HeaderName {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (HeaderNameInner::Known(a), HeaderNameInner::Known(b)) => a == b,
            _ => self.as_str().eq_ignore_ascii_case(other.as_str()),
        }
    }
}

impl From<KnownHeaderName> for HeaderName {
    fn from(known: KnownHeaderName) -> Self {
        Self(HeaderNameInner::Known(known))
    }
}

impl From<&str> for HeaderName {
    fn from(name: &str) -> Self {
        match KnownHeaderName::from_bytes_ignore_case(name.as_bytes()) {
            Some(known) => Self(HeaderNameInner::Known(known)),
            None => Self(HeaderNameInner::Unknown(name.into())),
        }
    }
}

impl From<String> for HeaderName {
    fn from(name: String) -> Self {
        match KnownHeaderName::from_bytes_ignore_case(name.as_bytes()) {
            Some(known) => Self(HeaderNameInner::Known(known)),
            None => Self(HeaderNameInner::Unknown(name.into_boxed_str())),
        }
    }
}

impl Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Debug for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self.as_str(), f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interning() {
        let name = HeaderName::from("content-length");
        assert_eq!(name.as_str(), "Content-Length");
        let name = HeaderName::from("X-Forwarded-For");
        assert_eq!(name.as_str(), "X-Forwarded-For");
    }

    #[test]
    fn case_insensitive_eq() {
        assert_eq!(HeaderName::from("HOST"), KnownHeaderName::Host.into());
        assert_eq!(HeaderName::from("x-thing"), HeaderName::from("X-Thing"));
        assert_ne!(HeaderName::from("x-thing"), HeaderName::from("x-other"));
    }
}
