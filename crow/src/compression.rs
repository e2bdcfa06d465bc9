/// The response compressions the server knows how to advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    /// `Content-Encoding: gzip`
    Gzip,
    /// `Content-Encoding: deflate`
    Deflate,
}

impl CompressionAlgorithm {
    /// the coding token used in `Accept-Encoding` and `Content-Encoding`
    pub const fn token(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
        }
    }
}

/// The hook a compression backend implements.
///
/// The core owns only the policy: a compressor installed with
/// `App::use_compression` is invoked for compression-eligible responses
/// whose request advertised the algorithm's coding, and the matching
/// `Content-Encoding` header is added. The codec itself lives outside the
/// core.
pub trait Compressor: Send + Sync + 'static {
    /// which coding this backend produces
    fn algorithm(&self) -> CompressionAlgorithm;

    /// compress a response body
    fn compress(&self, body: &[u8]) -> Vec<u8>;
}
