use tracing::trace;

use crate::command::{Command, END_MARKER};
use crate::error::{CodecError, CodecResult};

/// Where a compressed block lives and how big it is on both sides.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompressionBlock {
    /// Offset of the first control byte in the source buffer.
    pub offset: usize,
    /// Bytes consumed from the source, end marker included.
    pub compressed_len: usize,
    /// Bytes produced.
    pub decompressed_len: usize,
}

impl CompressionBlock {
    /// One past the last compressed byte.
    pub fn end(&self) -> usize {
        self.offset + self.compressed_len
    }
}

/// Output of a successful decode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedBlock {
    pub data: Vec<u8>,
    pub block: CompressionBlock,
}

/// Streaming decoder over one compressed block.
pub struct Decoder<'a> {
    input: &'a [u8],
    base: usize,
    pos: usize,
    out: Vec<u8>,
    limit: Option<usize>,
}

impl<'a> Decoder<'a> {
    /// Decode the block starting at `offset` inside `source`.
    ///
    /// `source` may extend past the block; decoding stops at the end marker.
    pub fn new(source: &'a [u8], offset: usize) -> Self {
        let input = source.get(offset..).unwrap_or(&[]);
        Self {
            input,
            base: offset,
            pos: 0,
            out: Vec::new(),
            limit: None,
        }
    }

    /// Fail instead of producing more than `limit` bytes.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn next_byte(&mut self, expected: &'static str) -> CodecResult<u8> {
        let byte = self
            .input
            .get(self.pos)
            .copied()
            .ok_or(CodecError::Truncated {
                offset: self.pos,
                expected,
            })?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, n: usize, expected: &'static str) -> CodecResult<&'a [u8]> {
        let end = self.pos + n;
        if end > self.input.len() {
            return Err(CodecError::Truncated {
                offset: self.pos,
                expected,
            });
        }
        let input: &'a [u8] = self.input;
        let bytes = &input[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn reserve(&self, produced: usize) -> CodecResult<()> {
        match self.limit {
            Some(limit) if self.out.len() + produced > limit => {
                Err(CodecError::OutputLimitExceeded { limit })
            }
            _ => Ok(()),
        }
    }

    /// Run to the end marker.
    pub fn run(mut self) -> CodecResult<DecodedBlock> {
        loop {
            let token_start = self.pos;
            let control = self.next_byte("control byte or end marker")?;
            if control == END_MARKER {
                break;
            }

            let mut code = control >> 5;
            let mut len = (control & 0x1F) as usize + 1;
            if code == 7 {
                code = (control >> 2) & 0x07;
                let low = self.next_byte("extended length byte")?;
                len = (((control & 0x03) as usize) << 8 | low as usize) + 1;
            }
            let command = Command::from_code(code).ok_or(CodecError::UnknownCommand {
                offset: token_start,
                control,
            })?;

            trace!(offset = token_start, ?command, len, "token");
            self.apply(token_start, command, len)?;
        }

        let block = CompressionBlock {
            offset: self.base,
            compressed_len: self.pos,
            decompressed_len: self.out.len(),
        };
        Ok(DecodedBlock {
            data: self.out,
            block,
        })
    }

    fn apply(&mut self, token_start: usize, command: Command, len: usize) -> CodecResult<()> {
        match command {
            Command::Literal => {
                self.reserve(len)?;
                let bytes = self.take(len, "literal bytes")?;
                self.out.extend_from_slice(bytes);
            }
            Command::ByteFill => {
                let value = self.next_byte("fill byte")?;
                self.reserve(len)?;
                self.out.resize(self.out.len() + len, value);
            }
            Command::WordFill => {
                let word = self.take(2, "fill word")?;
                let (a, b) = (word[0], word[1]);
                self.reserve(2 * len)?;
                for _ in 0..len {
                    self.out.push(a);
                    self.out.push(b);
                }
            }
            Command::IncreasingFill => {
                let start = self.next_byte("fill start byte")?;
                self.reserve(len)?;
                self.out
                    .extend((0..len).map(|i| start.wrapping_add(i as u8)));
            }
            Command::Copy | Command::BitReversedCopy | Command::BackwardCopy => {
                let hi = self.next_byte("reference high byte")?;
                let lo = self.next_byte("reference low byte")?;
                let from = u16::from_be_bytes([hi, lo]) as usize;
                let produced = self.out.len();

                let in_range = from < produced
                    && (command != Command::BackwardCopy || from + 1 >= len);
                if !in_range {
                    return Err(CodecError::ReferenceOutOfRange {
                        offset: token_start,
                        from,
                        length: len,
                        produced,
                    });
                }
                self.reserve(len)?;

                // Byte at a time: forward copies may overlap their own output.
                for i in 0..len {
                    let byte = match command {
                        Command::Copy => self.out[from + i],
                        Command::BitReversedCopy => self.out[from + i].reverse_bits(),
                        _ => self.out[from - i],
                    };
                    self.out.push(byte);
                }
            }
        }
        Ok(())
    }
}

/// Decode a complete compressed stream.
pub fn decompress(input: &[u8]) -> CodecResult<Vec<u8>> {
    Decoder::new(input, 0).run().map(|decoded| decoded.data)
}

/// Decode the block at `offset` inside `source`, reporting its extent.
pub fn decompress_block(
    source: &[u8],
    offset: usize,
    limit: Option<usize>,
) -> CodecResult<DecodedBlock> {
    let decoder = Decoder::new(source, offset);
    match limit {
        Some(limit) => decoder.with_limit(limit).run(),
        None => decoder.run(),
    }
}
