use std::io::Read;

use bytes::Bytes;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use http::{HeaderMap, Method, StatusCode};

use crate::error::Error;

fn read_to_end_limited<R: Read>(
    reader: &mut R,
    encoding: &str,
    max_bytes: usize,
) -> Result<Vec<u8>, Error> {
    let mut decoded = Vec::new();
    let mut chunk = [0_u8; 8 * 1024];

    loop {
        let read = reader
            .read(&mut chunk)
            .map_err(|error| Error::DecodeContentEncoding {
                encoding: encoding.to_owned(),
                message: error.to_string(),
            })?;
        if read == 0 {
            break;
        }
        let next_size = decoded.len().saturating_add(read);
        if next_size > max_bytes {
            return Err(Error::DecodedBodyTooLarge {
                limit_bytes: max_bytes,
                actual_bytes: next_size,
            });
        }
        decoded.extend_from_slice(&chunk[..read]);
    }

    Ok(decoded)
}

/// Returns the declared `Content-Encoding` when the response body should be
/// decoded before the caller sees it.
pub(crate) fn pending_content_encoding(
    method: &Method,
    status: StatusCode,
    headers: &HeaderMap,
) -> Option<String> {
    if *method == Method::HEAD {
        return None;
    }
    if status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return None;
    }
    let declared_empty = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim() == "0");
    if declared_empty {
        return None;
    }
    let encoding = headers.get(CONTENT_ENCODING)?.to_str().ok()?.trim();
    if encoding.is_empty() || encoding.eq_ignore_ascii_case("identity") {
        return None;
    }
    Some(encoding.to_owned())
}

/// The decoded body no longer matches these headers.
pub(crate) fn remove_content_encoding_headers(headers: &mut HeaderMap) {
    headers.remove(CONTENT_ENCODING);
    headers.remove(CONTENT_LENGTH);
}

/// Undoes every coding listed in `content_encoding`, last applied first.
/// Each decoding step may produce at most `max_bytes`.
pub(crate) fn decode_content_encoded_body(
    mut body: Bytes,
    content_encoding: &str,
    max_bytes: usize,
) -> Result<Bytes, Error> {
    let max_bytes = max_bytes.max(1);
    if body.is_empty() {
        return Ok(body);
    }
    let mut encodings = content_encoding
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>();

    while let Some(encoding) = encodings.pop() {
        let decoded = match encoding.to_ascii_lowercase().as_str() {
            "identity" => continue,
            "gzip" | "x-gzip" => {
                let mut decoder = flate2::read::GzDecoder::new(body.as_ref());
                read_to_end_limited(&mut decoder, encoding, max_bytes)?
            }
            "deflate" => {
                let mut decoder = flate2::read::ZlibDecoder::new(body.as_ref());
                read_to_end_limited(&mut decoder, encoding, max_bytes)?
            }
            "br" => {
                let mut decoder = brotli::Decompressor::new(body.as_ref(), 4096);
                read_to_end_limited(&mut decoder, encoding, max_bytes)?
            }
            "zstd" => {
                let mut decoder = zstd::stream::read::Decoder::new(body.as_ref()).map_err(
                    |error| Error::DecodeContentEncoding {
                        encoding: encoding.to_owned(),
                        message: error.to_string(),
                    },
                )?;
                read_to_end_limited(&mut decoder, encoding, max_bytes)?
            }
            other => {
                return Err(Error::DecodeContentEncoding {
                    encoding: other.to_owned(),
                    message: "unsupported content-encoding".to_owned(),
                });
            }
        };
        body = Bytes::from(decoded);
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use bytes::Bytes;
    use flate2::Compression;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, HeaderValue};
    use http::{HeaderMap, Method, StatusCode};

    use super::{decode_content_encoded_body, pending_content_encoding};
    use crate::error::{Error, ErrorCode};

    const LIMIT: usize = 1024 * 1024;

    fn gzip(payload: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).expect("write gzip payload");
        encoder.finish().expect("finish gzip payload")
    }

    #[test]
    fn decodes_gzip() {
        let decoded = decode_content_encoded_body(Bytes::from(gzip(b"hello")), "gzip", LIMIT)
            .expect("gzip should decode");
        assert_eq!(decoded, Bytes::from_static(b"hello"));
    }

    #[test]
    fn decodes_stacked_encodings_in_reverse_order() {
        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(&gzip(b"layered")).expect("write deflate payload");
        let encoded = zlib.finish().expect("finish deflate payload");

        let decoded = decode_content_encoded_body(Bytes::from(encoded), "gzip, deflate", LIMIT)
            .expect("stacked encodings should decode");
        assert_eq!(decoded, Bytes::from_static(b"layered"));
    }

    #[test]
    fn decoded_size_is_capped() {
        let compressed = gzip(&vec![b'a'; 64 * 1024]);
        assert!(compressed.len() < 1024);

        let error = decode_content_encoded_body(Bytes::from(compressed), "gzip", 16 * 1024)
            .expect_err("expansion beyond the limit");
        assert_eq!(error.code(), ErrorCode::DecodedBodyTooLarge);
        match error {
            Error::DecodedBodyTooLarge {
                limit_bytes,
                actual_bytes,
            } => {
                assert_eq!(limit_bytes, 16 * 1024);
                assert!(actual_bytes > limit_bytes);
            }
            other => panic!("unexpected error variant: {other}"),
        }
    }

    #[test]
    fn rejects_unknown_encoding() {
        let error = decode_content_encoded_body(Bytes::from_static(b"abc"), "compress", LIMIT)
            .expect_err("unknown encoding");
        match error {
            Error::DecodeContentEncoding { encoding, .. } => assert_eq!(encoding, "compress"),
            other => panic!("unexpected error variant: {other}"),
        }
    }

    #[test]
    fn skips_head_no_content_and_declared_empty_bodies() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));

        assert_eq!(
            pending_content_encoding(&Method::GET, StatusCode::OK, &headers).as_deref(),
            Some("gzip")
        );
        assert!(pending_content_encoding(&Method::HEAD, StatusCode::OK, &headers).is_none());
        assert!(
            pending_content_encoding(&Method::GET, StatusCode::NO_CONTENT, &headers).is_none()
        );

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        assert!(pending_content_encoding(&Method::GET, StatusCode::OK, &headers).is_none());
    }
}
