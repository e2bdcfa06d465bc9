/// Tunables for the per-connection machinery. One of these is embedded in
/// the app's configuration and shared by every connection.
#[derive(Clone, Copy, Debug)]
pub struct HttpConfig {
    /// size of the fixed read buffer each connection fills from its socket
    pub read_buffer_len: usize,
    /// cap on the combined octets of request line and headers
    pub max_head_len: usize,
    /// bodies at or above this size are written in chunks instead of a
    /// single buffered write
    pub stream_threshold: usize,
    /// block size for chunked body writes and static file streaming
    pub write_block_len: usize,
    /// tolerate `Content-Length` alongside a non-chunked-final
    /// `Transfer-Encoding`
    pub lenient_parsing: bool,
}

impl HttpConfig {
    /// see [`HttpConfig::stream_threshold`]
    pub fn with_stream_threshold(mut self, stream_threshold: usize) -> Self {
        self.stream_threshold = stream_threshold;
        self
    }

    /// see [`HttpConfig::max_head_len`]
    pub fn with_max_head_len(mut self, max_head_len: usize) -> Self {
        self.max_head_len = max_head_len;
        self
    }

    /// see [`HttpConfig::read_buffer_len`]
    pub fn with_read_buffer_len(mut self, read_buffer_len: usize) -> Self {
        self.read_buffer_len = read_buffer_len;
        self
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        DEFAULT_CONFIG
    }
}

/// the defaults: 4 KiB reads, 80 KiB head cap, 1 MiB stream threshold,
/// 16 KiB write blocks
pub const DEFAULT_CONFIG: HttpConfig = HttpConfig {
    read_buffer_len: 4 * 1024,
    max_head_len: 80 * 1024,
    stream_threshold: 1024 * 1024,
    write_block_len: 16 * 1024,
    lenient_parsing: false,
};
