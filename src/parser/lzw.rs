use std::io::Read;

use log::{debug, trace};

use super::bit_reader::SubBlockReader;
use super::dictionary::{Code, CodeDictionary, LookupError};
use super::error::DecodeError;
use super::pixel_sink::PixelSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    ExpectClear,
    /// The next code must be a literal, nothing gets added to the dictionary
    /// for it. Entered after every clear code.
    ExpectFirstLiteral,
    Streaming { previous: Code },
    Done,
}

/// Decodes one LZW compressed image data block.
struct LzwDecoder<'s, 'a, R> {
    reader: SubBlockReader<R>,
    dictionary: CodeDictionary,
    sink: &'s mut PixelSink<'a>,
    declared_pixels: u64,
    decoded_pixels: u64,
    // scratch buffer for expanding runs
    run: Vec<u8>,
}

/// Decodes the sub-blocks following the root code size byte of an image and
/// writes `declared_pixels` color indices into `sink`. On success the data
/// block has been consumed up to and including its terminator.
///
/// On failure the sink's region is left partially written.
pub(crate) fn decode<R: Read>(
    inner: R,
    root_code_size: u8,
    declared_pixels: u64,
    sink: &mut PixelSink<'_>,
) -> Result<(), DecodeError> {
    let mut decoder = LzwDecoder {
        reader: SubBlockReader::new(inner),
        dictionary: CodeDictionary::new(root_code_size)?,
        sink,
        declared_pixels,
        decoded_pixels: 0,
        run: Vec::new(),
    };

    let mut state = DecoderState::ExpectClear;
    while state != DecoderState::Done {
        let code = decoder.read_code()?;
        state = decoder.step(state, code)?;
    }

    let skipped = decoder.reader.finish()?;
    if skipped > 0 {
        debug!("skipped {skipped} bytes of image data after the end of information code");
    }

    Ok(())
}

impl<'s, 'a, R: Read> LzwDecoder<'s, 'a, R> {
    fn read_code(&mut self) -> Result<Code, DecodeError> {
        match self.reader.read_code(self.dictionary.code_width()) {
            Err(DecodeError::UnexpectedEof) if self.reader.is_terminated() => Err(DecodeError::malformed(format!(
                "data block ended after {} of {} pixels without an end of information code",
                self.decoded_pixels, self.declared_pixels
            ))),
            result => result,
        }
    }

    fn step(&mut self, state: DecoderState, code: Code) -> Result<DecoderState, DecodeError> {
        use DecoderState::*;

        let clear_code = self.dictionary.clear_code();
        let end_of_information_code = self.dictionary.end_of_information_code();

        match state {
            ExpectClear => {
                if code != clear_code {
                    return Err(DecodeError::malformed(format!(
                        "image data starts with code {code} instead of the clear code {clear_code}"
                    )));
                }
                Ok(ExpectFirstLiteral)
            },
            ExpectFirstLiteral => {
                if code == end_of_information_code {
                    return self.end_of_information();
                }
                self.ensure_pixels_remaining(code)?;

                if code == clear_code {
                    self.clear();
                    return Ok(ExpectFirstLiteral);
                }

                self.dictionary.lookup(code).map_err(|error| {
                    DecodeError::malformed(format!("first code after a clear must be a literal: {error}"))
                })?;
                self.emit_run(code, None)?;
                Ok(Streaming { previous: code })
            },
            Streaming { previous } => {
                if code == end_of_information_code {
                    return self.end_of_information();
                }
                self.ensure_pixels_remaining(code)?;

                if code == clear_code {
                    self.clear();
                    return Ok(ExpectFirstLiteral);
                }

                if self.dictionary.is_full() {
                    return Err(DecodeError::malformed(format!(
                        "code {code} follows a full dictionary, expected the clear code {clear_code}"
                    )));
                }

                let first = match self.dictionary.lookup(code) {
                    Ok(entry) => {
                        let first = entry.first();
                        self.emit_run(code, None)?;
                        first
                    },
                    Err(LookupError::NotYetDefined(_)) => {
                        // the code is about to be defined as {previous} + first of {previous}
                        let first = self.dictionary.lookup(previous)?.first();
                        self.emit_run(previous, Some(first))?;
                        first
                    },
                    Err(error) => return Err(error.into()),
                };

                self.dictionary.insert(previous, first)?;
                Ok(Streaming { previous: code })
            },
            Done => unreachable!("no codes are read once decoding is done"),
        }
    }

    fn clear(&mut self) {
        trace!(
            "clear code after {} pixels with {} codes defined",
            self.decoded_pixels,
            self.dictionary.next_free_code()
        );
        self.dictionary.reset();
    }

    fn end_of_information(&self) -> Result<DecoderState, DecodeError> {
        if self.decoded_pixels != self.declared_pixels {
            return Err(DecodeError::malformed(format!(
                "end of information after {} of {} pixels",
                self.decoded_pixels, self.declared_pixels
            )));
        }

        debug!("decoded {} pixels", self.decoded_pixels);
        Ok(DecoderState::Done)
    }

    fn ensure_pixels_remaining(&self, code: Code) -> Result<(), DecodeError> {
        if self.decoded_pixels >= self.declared_pixels {
            return Err(DecodeError::malformed(format!(
                "code {code} after all {} pixels were decoded, expected the end of information code",
                self.declared_pixels
            )));
        }
        Ok(())
    }

    /// Counts `count` more pixels, refusing to go past the declared total.
    fn emit_pixels(&mut self, count: usize) -> Result<(), DecodeError> {
        let decoded = self.decoded_pixels + count as u64;
        if decoded > self.declared_pixels {
            return Err(DecodeError::malformed(format!(
                "image data holds more than the declared {} pixels",
                self.declared_pixels
            )));
        }
        self.decoded_pixels = decoded;
        Ok(())
    }

    /// Writes the run of `code`, followed by `trailing` when given. The whole
    /// output is counted before anything reaches the sink.
    fn emit_run(&mut self, code: Code, trailing: Option<u8>) -> Result<(), DecodeError> {
        self.dictionary.expand(code, &mut self.run)?;
        self.run.extend(trailing);
        self.emit_pixels(self.run.len())?;
        for &index in &self.run {
            self.sink.write(index)?;
        }
        Ok(())
    }
}
