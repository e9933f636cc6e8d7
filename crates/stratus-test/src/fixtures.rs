//! Message fixtures and test logging

use std::sync::Once;

use stratus_htx::{BlockType, Buffer, Htx, PayloadLength, StartLine};
use stratus_mux::Stream;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING: Once = Once::new();

/// Install a fmt subscriber once per test binary.
///
/// Filter from `RUST_LOG`, clock and mux debug output otherwise.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "stratus_time=debug,stratus_mux=trace".into()))
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

/// Shape of a generated message
#[derive(Clone, Debug)]
pub struct MessageSpec {
    /// Request or response start line, with headers
    pub headers: Vec<(&'static [u8], Vec<u8>)>,
    pub request: bool,
    /// Body bytes
    pub body: Vec<u8>,
    /// Trailer fields; an end-of-trailers block follows when not empty
    pub trailers: Vec<(&'static [u8], Vec<u8>)>,
    /// Announced payload beyond `body`
    pub extra: PayloadLength,
    pub eom: bool,
}

impl MessageSpec {
    /// `GET /` with a host header and no body
    pub fn get() -> Self {
        MessageSpec {
            headers: vec![(&b"host"[..], b"stratus.test".to_vec())],
            request: true,
            body: Vec::new(),
            trailers: Vec::new(),
            extra: PayloadLength::None,
            eom: true,
        }
    }

    /// `200 OK` carrying `body`
    pub fn response(body: Vec<u8>) -> Self {
        let len = body.len().to_string().into_bytes();
        MessageSpec {
            headers: vec![(&b"content-length"[..], len)],
            request: false,
            body,
            trailers: Vec::new(),
            extra: PayloadLength::None,
            eom: true,
        }
    }

    /// Bare body with no header section
    pub fn body_only(len: usize, eom: bool) -> Self {
        MessageSpec {
            headers: Vec::new(),
            request: false,
            body: pattern(len),
            trailers: Vec::new(),
            extra: PayloadLength::None,
            eom,
        }
    }

    /// Chunked response whose length is not announced
    pub fn chunked(body: Vec<u8>) -> Self {
        MessageSpec {
            headers: vec![(&b"transfer-encoding"[..], b"chunked".to_vec())],
            trailers: vec![(&b"x-checksum"[..], b"0".to_vec())],
            extra: PayloadLength::Unknown,
            ..Self::response(body)
        }
    }

    /// Write the message into `buf`.
    ///
    /// Returns how many body bytes fit.
    pub fn write(&self, buf: &mut Buffer) -> usize {
        let mut htx = Htx::from_buf(buf);
        if !self.headers.is_empty() {
            let (ty, sl) = if self.request {
                (BlockType::ReqSl, StartLine::new(b"GET", b"/", b"HTTP/3"))
            } else {
                (BlockType::ResSl, StartLine::new(b"HTTP/3", b"200", b"OK"))
            };
            if htx.add_stline(ty, sl).is_err() {
                return 0;
            }
            for (name, value) in &self.headers {
                if htx.add_header(name, value).is_err() {
                    return 0;
                }
            }
            if htx.add_endof(BlockType::Eoh).is_err() {
                return 0;
            }
        }

        let written = htx.add_data(&self.body);
        if written < self.body.len() {
            return written;
        }

        if !self.trailers.is_empty() {
            for (name, value) in &self.trailers {
                if htx.add_trailer(name, value).is_err() {
                    return written;
                }
            }
            if htx.add_endof(BlockType::Eot).is_err() {
                return written;
            }
        }

        htx.set_extra(self.extra);
        if self.eom {
            htx.set_eom();
        }
        written
    }

    /// Write the message into the receive buffer of `stream`
    pub fn deliver(&self, stream: &mut Stream) -> usize {
        self.write(stream.rx_app_buf())
    }
}

/// Recognisable body bytes
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| b'a' + (i % 26) as u8).collect()
}

/// Body bytes held in `buf`, in order
pub fn body_of(buf: &mut Buffer) -> Vec<u8> {
    let htx = Htx::from_buf(buf);
    let body = htx
        .blocks()
        .filter(|b| b.block_type() == BlockType::Data)
        .flat_map(|b| b.payload().to_vec())
        .collect();
    body
}

/// Block types held in `buf`, in order
pub fn block_types(buf: &mut Buffer) -> Vec<BlockType> {
    let htx = Htx::from_buf(buf);
    let types = htx.blocks().map(|b| b.block_type()).collect();
    types
}
