//! Chunk-at-a-time inflation for persistent zlib streams.
//!
//! Tight and ZRLE both hand the decompressor length-prefixed chunks cut
//! from one continuous zlib stream, so the `Decompress` state must outlive
//! any single chunk. These helpers inflate exactly one chunk while leaving
//! the stream's dictionary intact for the next.

use anyhow::{bail, Result};
use flate2::{Decompress, FlushDecompress, Status};

/// Inflate one compressed chunk whose decompressed size is known.
///
/// The chunk may end in a sync-flush marker that yields no output; those
/// trailer bytes are drained so the stream is positioned for the next
/// chunk. A chunk producing more or fewer bytes than expected is an error.
pub(crate) fn inflate_exact(
    stream: &mut Decompress,
    mut input: &[u8],
    expected: usize,
) -> Result<Vec<u8>> {
    let mut output = vec![0u8; expected];
    let mut overflow = [0u8; 64];
    let mut filled = 0usize;

    while filled < expected || !input.is_empty() {
        let before_in = stream.total_in();
        let before_out = stream.total_out();
        let (status, into_output) = if filled < expected {
            let s = stream.decompress(input, &mut output[filled..], FlushDecompress::Sync)?;
            (s, true)
        } else {
            let s = stream.decompress(input, &mut overflow, FlushDecompress::Sync)?;
            (s, false)
        };
        let consumed = (stream.total_in() - before_in) as usize;
        let produced = (stream.total_out() - before_out) as usize;
        input = &input[consumed..];

        if into_output {
            filled += produced;
        } else if produced > 0 {
            bail!(
                "zlib chunk produced more than the expected {} bytes",
                expected
            );
        }

        if status == Status::StreamEnd {
            break;
        }
        if consumed == 0 && produced == 0 {
            bail!(
                "zlib stream stalled: {} of {} bytes produced, {} input bytes left",
                filled,
                expected,
                input.len()
            );
        }
    }

    if filled != expected {
        bail!("zlib chunk produced {} bytes, expected {}", filled, expected);
    }
    Ok(output)
}

/// Inflate one compressed chunk of unknown decompressed size.
pub(crate) fn inflate_to_end(stream: &mut Decompress, mut input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(input.len().saturating_mul(4).max(1024));
    let mut spare = [0u8; 16 * 1024];

    loop {
        let before_in = stream.total_in();
        let before_out = stream.total_out();
        let status = stream.decompress(input, &mut spare, FlushDecompress::Sync)?;
        let consumed = (stream.total_in() - before_in) as usize;
        let produced = (stream.total_out() - before_out) as usize;
        output.extend_from_slice(&spare[..produced]);
        input = &input[consumed..];

        if status == Status::StreamEnd {
            break;
        }
        // Drained the input and the inflater has nothing buffered.
        if input.is_empty() && produced < spare.len() {
            break;
        }
        if consumed == 0 && produced == 0 {
            bail!(
                "zlib stream stalled with {} input bytes remaining",
                input.len()
            );
        }
    }

    Ok(output)
}

/// Test helper: compress `parts` as one continuous zlib stream, flushing
/// after each part so every part is a self-delimiting chunk of the same
/// stream. Later chunks only inflate on a decompressor that saw the
/// earlier ones.
#[cfg(test)]
pub(crate) fn compress_chunked(parts: &[&[u8]]) -> Vec<Vec<u8>> {
    use flate2::{Compress, Compression, FlushCompress};

    let mut compressor = Compress::new(Compression::default(), true);
    let mut chunks = Vec::new();
    for part in parts {
        let mut chunk = Vec::with_capacity(part.len() + 64);
        compressor
            .compress_vec(part, &mut chunk, FlushCompress::Sync)
            .unwrap();
        chunks.push(chunk);
    }
    chunks
}
