/// Binary-to-text encoding for inline image payloads.
///
/// The buffer is fed to one incremental base64 encoder in fixed 32 KiB
/// chunks. Because a single encoder instance spans all chunks, the output is
/// byte-identical to encoding the whole buffer in one pass, even though
/// 32 KiB is not a multiple of the 3-byte base64 group size.
use std::io::Write as _;

use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderStringWriter;

const ENCODE_CHUNK: usize = 32 * 1024;

/// Standard base64 of `bytes`, assembled chunk by chunk.
pub fn base64_chunked(bytes: &[u8]) -> String {
    let mut encoder = EncoderStringWriter::new(&STANDARD);
    for chunk in bytes.chunks(ENCODE_CHUNK) {
        // Writes to a String-backed encoder are infallible.
        let _ = encoder.write_all(chunk);
    }
    encoder.into_inner()
}

/// Wrap `bytes` into a `data:<mime>;base64,<payload>` URL.
pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, base64_chunked(bytes))
}
