//! The blocking HTTP(S) reader (C3, synchronous half).
//!
//! Opens with a `HEAD` request to learn the resource's size and whether the
//! server advertises byte-range support, then serves each `read` as a
//! `Range` `GET`. The underlying `reqwest::blocking::Client` is reused
//! across reads (and, when the caller hasn't overridden proxy/TLS/SSRF
//! settings, across the whole process) so DNS, connection, and TLS session
//! state are amortised — see [`crate::net::transport`].

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, RANGE};
use reqwest::StatusCode;

use super::{Reader, SeekOutcome};
use crate::config::CompareOptions;
use crate::error::{Error, ErrorKind, Result};
use crate::net;

/// A [`Reader`] over an `http://`/`https://` resource.
#[derive(Debug)]
pub struct HttpReader {
    client: Client,
    url: String,
    headers: HeaderMap,
    size: Option<u64>,
    range_capable: bool,
    offset: u64,
    /// Set once a range-incapable server has served its one legal full-body
    /// read; any further read/seek is an error.
    exhausted: bool,
    timeout: std::time::Duration,
}

fn build_headers(opts: &CompareOptions) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in &opts.headers {
        let hn = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::new(ErrorKind::InvalidOption, format!("bad header name {name:?}: {e}")))?;
        let hv = HeaderValue::from_str(value)
            .map_err(|e| Error::new(ErrorKind::InvalidOption, format!("bad header value for {name:?}: {e}")))?;
        map.insert(hn, hv);
    }
    Ok(map)
}

impl HttpReader {
    /// Open `url`, issuing a `HEAD` request to learn size/range support.
    pub fn open(url: &str, opts: &CompareOptions) -> Result<Self> {
        let client = net::client_for(opts)?;
        let headers = build_headers(opts)?;

        let resp = client
            .head(url)
            .headers(headers.clone())
            .timeout(opts.timeout)
            .send()
            .map_err(map_reqwest_err)?;

        if !resp.status().is_success() {
            return Err(status_error(resp.status()));
        }

        let size = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let range_capable = resp
            .headers()
            .get(reqwest::header::ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false);

        Ok(Self {
            client,
            url: url.to_string(),
            headers,
            size,
            range_capable,
            offset: 0,
            exhausted: false,
            timeout: opts.timeout,
        })
    }

    fn range_get(&self, start: u64, end_inclusive: u64) -> Result<Response> {
        let mut headers = self.headers.clone();
        headers.insert(
            RANGE,
            HeaderValue::from_str(&format!("bytes={start}-{end_inclusive}"))
                .expect("range header value is always valid ASCII"),
        );
        self.client
            .get(&self.url)
            .headers(headers)
            .timeout(self.timeout)
            .send()
            .map_err(map_reqwest_err)
    }

    fn full_get(&self) -> Result<Response> {
        self.client
            .get(&self.url)
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .send()
            .map_err(map_reqwest_err)
    }
}

fn map_reqwest_err(e: reqwest::Error) -> Error {
    e.into()
}

fn status_error(status: StatusCode) -> Error {
    Error::new(
        ErrorKind::HttpStatus,
        format!("unexpected HTTP status {status}"),
    )
}

impl Reader for HttpReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.exhausted {
            return Ok(0);
        }
        if let Some(size) = self.size {
            if self.offset >= size {
                return Ok(0);
            }
        }

        if self.range_capable {
            let end = self.offset + buf.len() as u64 - 1;
            let resp = self.range_get(self.offset, end)?;
            match resp.status() {
                StatusCode::PARTIAL_CONTENT => {
                    let bytes = resp.bytes().map_err(map_reqwest_err)?;
                    if bytes.len() > buf.len() {
                        return Err(Error::new(
                            ErrorKind::RangeInconsistent,
                            format!("{}: server returned more bytes than requested", self.url),
                        ));
                    }
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    self.offset += bytes.len() as u64;
                    Ok(bytes.len())
                }
                StatusCode::OK if self.offset == 0 => {
                    // Server ignored Range despite advertising support.
                    // Treat this read as the only legal one.
                    self.range_capable = false;
                    let bytes = resp.bytes().map_err(map_reqwest_err)?;
                    if bytes.len() > buf.len() {
                        return Err(Error::new(
                            ErrorKind::RangeInconsistent,
                            format!("{}: server ignored Range and over-read", self.url),
                        ));
                    }
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    self.offset += bytes.len() as u64;
                    self.exhausted = true;
                    Ok(bytes.len())
                }
                StatusCode::RANGE_NOT_SATISFIABLE => Ok(0),
                other => Err(status_error(other)),
            }
        } else {
            if self.offset != 0 {
                return Err(Error::new(
                    ErrorKind::RangeInconsistent,
                    format!("{}: server does not support Range requests", self.url),
                ));
            }
            let resp = self.full_get()?;
            if resp.status() == StatusCode::OK {
                let bytes = resp.bytes().map_err(map_reqwest_err)?;
                if bytes.len() > buf.len() {
                    return Err(Error::new(
                        ErrorKind::RangeInconsistent,
                        format!("{}: body larger than buffer", self.url),
                    ));
                }
                buf[..bytes.len()].copy_from_slice(&bytes);
                self.offset += bytes.len() as u64;
                self.exhausted = true;
                Ok(bytes.len())
            } else {
                Err(status_error(resp.status()))
            }
        }
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn seek(&mut self, offset: u64) -> Result<SeekOutcome> {
        if !self.range_capable {
            return Ok(SeekOutcome::Unsupported);
        }
        self.offset = offset;
        Ok(SeekOutcome::Done)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn source_name(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    #[test]
    fn honours_range_requests() {
        let rt = rt();
        let server = rt.block_on(MockServer::start());
        rt.block_on(
            Mock::given(method("HEAD"))
                .and(path("/file.bin"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("Content-Length", "10")
                        .insert_header("Accept-Ranges", "bytes"),
                )
                .mount(&server),
        );
        rt.block_on(
            Mock::given(method("GET"))
                .and(path("/file.bin"))
                .and(header("Range", "bytes=2-5"))
                .respond_with(
                    ResponseTemplate::new(206)
                        .set_body_bytes(&b"2345"[..])
                        .insert_header("Content-Range", "bytes 2-5/10"),
                )
                .mount(&server),
        );

        let url = format!("{}/file.bin", server.uri());
        let opts = CompareOptions::default();
        let mut reader = HttpReader::open(&url, &opts).unwrap();
        assert_eq!(reader.size(), Some(10));
        reader.seek(2).unwrap();
        let mut buf = [0u8; 4];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf, b"2345");
    }

    #[test]
    fn not_found_is_mapped_to_http_status_error() {
        let rt = rt();
        let server = rt.block_on(MockServer::start());
        rt.block_on(
            Mock::given(method("HEAD"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server),
        );
        let opts = CompareOptions::default();
        let err = HttpReader::open(&server.uri(), &opts).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HttpStatus);
    }
}
