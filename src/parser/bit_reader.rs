use std::io::Read;

use log::trace;

use super::error::DecodeError;

/// Where the next byte of compressed data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// `remaining` data bytes are left in the current sub-block. A new length
    /// byte is read once it reaches zero.
    SubBlock { remaining: u8 },
    /// The zero-length block terminator has been consumed, only bits that are
    /// already buffered can still be handed out.
    BufferedOnly,
}

/// Reads LSB-first variable-width codes out of a sequence of length-prefixed
/// data sub-blocks.
pub(crate) struct SubBlockReader<R> {
    inner: R,
    framing: Framing,
    // index by bit, the next code starts at bit 0
    buffer: u32,
    bits_available: u8,
}

impl<R: Read> SubBlockReader<R> {
    /// `inner` must be positioned on the length byte of the first sub-block.
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            framing: Framing::SubBlock { remaining: 0 },
            buffer: 0,
            bits_available: 0,
        }
    }

    pub(crate) fn read_code(&mut self, width: u8) -> Result<u16, DecodeError> {
        debug_assert!((1..=12).contains(&width));

        while self.bits_available < width {
            let byte = self.next_data_byte()?;
            self.buffer |= u32::from(byte) << self.bits_available;
            self.bits_available += 8;
        }

        let code = (self.buffer & ((1 << width) - 1)) as u16;
        self.buffer >>= width;
        self.bits_available -= width;
        Ok(code)
    }

    /// Whether the block terminator has been read.
    pub(crate) fn is_terminated(&self) -> bool {
        self.framing == Framing::BufferedOnly
    }

    /// Skip whatever is left of the data block, including any trailing
    /// sub-blocks, up to and including the block terminator. Returns the number
    /// of data bytes that were thrown away.
    pub(crate) fn finish(mut self) -> Result<usize, DecodeError> {
        let mut skipped = 0;

        while let Framing::SubBlock { remaining } = self.framing {
            if remaining > 0 {
                let mut rest = vec![0; remaining.into()];
                self.inner.read_exact(&mut rest)?;
                skipped += rest.len();
            }

            self.framing = match self.read_byte()? {
                0 => Framing::BufferedOnly,
                length => Framing::SubBlock { remaining: length },
            };
        }

        Ok(skipped)
    }

    fn next_data_byte(&mut self) -> Result<u8, DecodeError> {
        loop {
            match self.framing {
                Framing::BufferedOnly => return Err(DecodeError::UnexpectedEof),
                Framing::SubBlock { remaining: 0 } => {
                    let length = self.read_byte()?;
                    trace!("starting sub-block of {length} bytes");
                    self.framing = match length {
                        0 => Framing::BufferedOnly,
                        length => Framing::SubBlock { remaining: length },
                    };
                }
                Framing::SubBlock { remaining } => {
                    let byte = self.read_byte()?;
                    self.framing = Framing::SubBlock { remaining: remaining - 1 };
                    return Ok(byte);
                }
            }
        }
    }

    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let mut buffer: [u8; 1] = [0; 1];
        self.inner.read_exact(&mut buffer)?;
        Ok(buffer[0])
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Read};

    use super::SubBlockReader;
    use crate::parser::error::DecodeError;
    use crate::parser::test_support::frame_sub_blocks;

    const BITS: &[u8] = &[
        0b10000100,
        0b10001111,
        0b10101001,
        0b11001011,
        0b11101101,
        0b00001111,
        0b10100011
    ];

    fn read_threes(stream: &[u8]) -> Vec<u16> {
        let mut reader = SubBlockReader::new(stream);
        (0..8).map(|_| reader.read_code(3).unwrap()).collect()
    }

    #[test]
    fn it_works() {
        let stream = frame_sub_blocks(BITS, 255);
        assert_eq!(read_threes(&stream), vec![4, 0, 6, 7, 0, 3, 2, 5]);
    }

    #[test]
    fn codes_span_sub_block_boundaries() {
        let single = read_threes(&frame_sub_blocks(BITS, 255));
        let split = read_threes(&frame_sub_blocks(BITS, 1));
        assert_eq!(single, split);

        let mut reader = SubBlockReader::new(&[2, 0xff, 0x0f, 1, 0xab, 0][..]);
        assert_eq!(reader.read_code(12).unwrap(), 0xfff);
        assert_eq!(reader.read_code(12).unwrap(), 0xab0);
    }

    #[test]
    fn terminator_switches_to_buffered_bits() {
        let mut reader = SubBlockReader::new(&[1, 0b1111_0101, 0][..]);
        assert_eq!(reader.read_code(4).unwrap(), 0b0101);
        assert!(!reader.is_terminated());
        assert_eq!(reader.read_code(2).unwrap(), 0b11);
        assert!(matches!(reader.read_code(4), Err(DecodeError::UnexpectedEof)));
        assert!(reader.is_terminated());
    }

    #[test]
    fn terminated_reader_keeps_handing_out_buffered_bits() {
        let mut reader = SubBlockReader::new(&[1, 0xff, 0][..]);
        assert_eq!(reader.read_code(3).unwrap(), 0b111);
        assert!(matches!(reader.read_code(6), Err(DecodeError::UnexpectedEof)));
        assert!(reader.is_terminated());
        assert_eq!(reader.read_code(5).unwrap(), 0b11111);
        assert!(matches!(reader.read_code(1), Err(DecodeError::UnexpectedEof)));
    }

    #[test]
    fn truncated_stream_is_unexpected_eof() {
        let mut reader = SubBlockReader::new(&[3, 0x12][..]);
        assert_eq!(reader.read_code(8).unwrap(), 0x12);
        assert!(matches!(reader.read_code(8), Err(DecodeError::UnexpectedEof)));

        let mut reader = SubBlockReader::new(&[][..]);
        assert!(matches!(reader.read_code(3), Err(DecodeError::UnexpectedEof)));
    }

    #[test]
    fn read_failures_are_io_errors() {
        struct Broken;

        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "nope"))
            }
        }

        let mut reader = SubBlockReader::new(Broken);
        assert!(matches!(reader.read_code(3), Err(DecodeError::Io(_))));
    }

    #[test]
    fn finish_skips_to_the_terminator() {
        let stream: &[u8] = &[2, 0x05, 0x00, 3, 1, 2, 3, 0, 0x3b];
        let mut input = stream;
        let mut reader = SubBlockReader::new(&mut input);
        assert_eq!(reader.read_code(3).unwrap(), 5);
        assert_eq!(reader.finish().unwrap(), 4);
        assert_eq!(input, &[0x3b]);
    }
}
