/// The version of the HTTP protocol in use. Crow serves HTTP/1.0 and
/// HTTP/1.1; other values exist only so that a parsed request can be
/// rejected with something more precise than a parse error.
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[non_exhaustive]
pub enum Version {
    /// HTTP/1.0
    Http1_0,

    /// HTTP/1.1
    Http1_1,
}

impl Version {
    /// construct a version from the numeric major/minor pair on the wire
    pub fn from_parts(major: u8, minor: u8) -> Option<Self> {
        match (major, minor) {
            (1, 0) => Some(Self::Http1_0),
            (1, 1) => Some(Self::Http1_1),
            _ => None,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Version::Http1_0 => "HTTP/1.0",
            Version::Http1_1 => "HTTP/1.1",
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn to_string() {
        assert_eq!("HTTP/1.0", Version::Http1_0.to_string());
        assert_eq!("HTTP/1.1", Version::Http1_1.to_string());
    }

    #[test]
    fn from_parts() {
        assert_eq!(Version::from_parts(1, 1), Some(Version::Http1_1));
        assert_eq!(Version::from_parts(2, 0), None);
    }
}
