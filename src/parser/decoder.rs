use super::lzw;
use super::pixel_sink::PixelSink;
use super::DisposalMethod;
use crate::raster::{Raster, Region, Rgb};

use thiserror::Error;
use anyhow::{Context, Result};
use log::{debug, warn};

use std::io::prelude::*;
use std::fmt::Debug;

const EXTENSION_INTRODUCER: u8 = 0x21;
const IMAGE_DESCRIPTOR_LABEL: u8 = 0x2c;
const TRAILER_LABEL: u8 = 0x3b;
const BLOCK_TERMINATOR: u8 = 0x00;

// Extension labels
const APPLICATION_EXTENSION: u8 = 0xff;
const COMMENT_EXTENSION: u8 = 0xfe;
const GRAPHIC_CONTROL_EXTENSION: u8 = 0xf9;
const PLAIN_TEXT_EXTENSION: u8 = 0x01;

#[derive(Debug)]
enum ExtensionType {
    Application,
    Comment,
    GraphicControl,
    PlainText,
}

impl TryFrom<u8> for ExtensionType {
    type Error = ParserError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        use ExtensionType::*;

        match value {
            APPLICATION_EXTENSION => Ok(Application),
            COMMENT_EXTENSION => Ok(Comment),
            GRAPHIC_CONTROL_EXTENSION => Ok(GraphicControl),
            PLAIN_TEXT_EXTENSION => Ok(PlainText),

            _ => Err(ParserError::InvalidExtensionLabel(value))
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct GraphicControlExtension {
    disposal_method: Option<DisposalMethod>,
    transparent_color_index: Option<u8>,
}

#[derive(Debug)]
pub(crate) struct ImageDescriptor {
    pub(crate) left_position: u16,
    pub(crate) top_position: u16,

    pub(crate) width: u16,
    pub(crate) height: u16,

    pub(crate) interlace_flag: bool,
    pub(crate) local_color_table_size: Option<usize>,
    pub(crate) local_color_table: Option<Box<[Rgb]>>,
}

impl ImageDescriptor {
    fn region(&self) -> Region {
        Region {
            left: self.left_position.into(),
            top: self.top_position.into(),
            width: self.width.into(),
            height: self.height.into(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct GraphicBlock {
    pub(crate) extension: Option<GraphicControlExtension>,
    pub(crate) descriptor: ImageDescriptor,
}

#[derive(Debug)]
pub(crate) enum Version {
    V87a,
    V89a
}

impl TryFrom<&str> for Version {
    type Error = ParserError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value {
            "87a" => Ok(Version::V87a),
            "89a" => Ok(Version::V89a),
            version => Err(ParserError::UnsupportedVersion(version.into()))
        }
    }
}

#[derive(Debug)]
pub(crate) struct LogicalScreenDescriptor {
    pub(crate) screen_width: u16,
    pub(crate) screen_height: u16,
    pub(crate) global_color_table_size: Option<usize>,
    pub(crate) background_color_index: u8,
}

/// What to undo on the canvas before the next image is drawn.
#[derive(Debug)]
struct PendingDisposal {
    region: Region,
    method: DisposalMethod,
    previous: Option<Raster>,
}

#[derive(Debug)]
pub(crate) enum ParserState {
    ProcessMagic,
    ProcessLogicalScreenDescriptor,
    ProcessGlobalColorTable,
    ProcessTrailer,

    DetermineNextBlock(Option<GraphicControlExtension>),
    ProcessExtension(u8, Option<GraphicControlExtension>),
    ProcessImageDescriptor(Option<GraphicControlExtension>),
    ProcessLocalColorTable(GraphicBlock),
    ProcessImageData(GraphicBlock),

    Done,
}

#[derive(Error, Debug)]
pub(crate) enum ParserError {
    #[error("signature is invalid")]
    InvalidSignature,

    #[error("version {0} in the header is unsupported")]
    UnsupportedVersion(String),

    #[error("encountered extension with label 0x{0:02x}, this label is not supported")]
    InvalidExtensionLabel(u8),

    #[error("encountered unexpected label, this label is not supported: {0}")]
    UnexpectedLabel(u8),

    #[error("{block} block has size {actual}, expected {expected}")]
    UnexpectedBlockSize {
        block: &'static str,
        expected: u8,
        actual: u8,
    },

    #[error("{0} block is not followed by a block terminator")]
    MissingBlockTerminator(&'static str),

    #[error("encountered application descriptor with name {name}, expected descriptor data length to be {expected}, actual length is {actual}")]
    UnexpectedApplicationDescriptorDataLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("image has neither a local nor a global color table")]
    MissingColorTable,

    #[error("interlaced images are not supported")]
    InterlacedImage,

    #[error("image at {left},{top} of size {width}x{height} does not fit the {screen_width}x{screen_height} logical screen")]
    ImageOutsideScreen {
        left: usize,
        top: usize,
        width: usize,
        height: usize,
        screen_width: usize,
        screen_height: usize,
    },

    #[error("no logical screen descriptor has been parsed")]
    MissingLogicalScreenDescriptor,
}

/// Parses a GIF stream and composites its images onto a canvas the size of
/// the logical screen.
#[derive(Debug)]
pub struct Decoder<'a, T: Read> {
    inner: &'a mut T,
    pub(crate) version: Option<Version>,
    pub(crate) logical_screen_descriptor: Option<LogicalScreenDescriptor>,
    pub(crate) global_color_table: Option<Box<[Rgb]>>,
    background: Rgb,
    canvas: Option<Raster>,
    pending_disposal: Option<PendingDisposal>,
    images_decoded: usize,
}

impl<'a, T: Read + Debug> Decoder<'a, T> {
    pub fn new(inner: &'a mut T) -> Self {
        Self {
            inner,
            version: None,
            logical_screen_descriptor: None,
            global_color_table: None,
            background: Rgb::BLACK,
            canvas: None,
            pending_disposal: None,
            images_decoded: 0,
        }
    }

    pub fn parse(&mut self) -> Result<()> {
        let mut state = ParserState::ProcessMagic;

        loop {
            debug!("begin parsing state {:?}", state);

            state = self.process_next_state(state)?;
            if let ParserState::Done = state {
                break Ok(());
            }
        }
    }

    pub(crate) fn images_decoded(&self) -> usize {
        self.images_decoded
    }

    /// The composited canvas, available once the logical screen descriptor
    /// has been parsed.
    pub(crate) fn into_canvas(self) -> Result<Raster> {
        Ok(self.canvas.ok_or(ParserError::MissingLogicalScreenDescriptor)?)
    }

    fn process_next_state(&mut self, next_state: ParserState) -> Result<ParserState>  {
        use ParserState::*;

        match next_state {
            ProcessMagic => {
                let signature = self.read_str(3)?;
                if signature.as_ref() != "GIF" {
                    return Err(ParserError::InvalidSignature.into())
                }
                debug!("processed signature, got GIF");

                self.version = Some(Version::try_from(self.read_str(3)?.as_ref())?);
                debug!("processed version, got {:?}", self.version);

                Ok(ProcessLogicalScreenDescriptor)
            },
            ProcessLogicalScreenDescriptor => {
                let screen_width = self.read_u16()?;
                let screen_height = self.read_u16()?;

                let packed_fields = self.read_byte()?;

                // packed field start
                let global_color_table_flag = packed_fields & 0b10000000 != 0;
                let color_resolution = ((packed_fields >> 4) & 0b00000111) + 1;
                let global_color_table_size = if global_color_table_flag {
                    Some(3 * (2_usize << (packed_fields & 0b00000111)))
                } else {
                    None
                };
                // packed field end

                let background_color_index = self.read_byte()?;
                let pixel_aspect_ratio = self.read_byte()?;

                self.logical_screen_descriptor = Some(LogicalScreenDescriptor {
                    screen_height,
                    screen_width,
                    global_color_table_size,
                    background_color_index,
                });

                debug!(
                    "processed logical screen descriptor, got: {:#?}, color resolution {color_resolution} bits, aspect ratio {pixel_aspect_ratio}",
                    self.logical_screen_descriptor
                );

                if global_color_table_flag {
                    Ok(ProcessGlobalColorTable)
                } else {
                    self.init_canvas()?;
                    Ok(DetermineNextBlock(None))
                }
            },
            ProcessGlobalColorTable => {
                let size = self
                    .logical_screen_descriptor
                    .as_ref()
                    .and_then(|screen_desc| screen_desc.global_color_table_size)
                    .ok_or(ParserError::MissingLogicalScreenDescriptor)?;

                self.global_color_table = Some(Rgb::from_table(&self.read_bytes(size)?));
                debug!("processed global color table with {} colors", size / 3);

                self.init_canvas()?;
                Ok(DetermineNextBlock(None))
            },
            ProcessTrailer => {
                if self.images_decoded == 0 {
                    warn!("reached the trailer without decoding any image");
                }
                Ok(Done)
            }
            DetermineNextBlock(graphic_control_extension) => {
                let introducer_or_label = self.read_byte()?;

                match introducer_or_label {
                    // extension introducer means that a label follows determining what exact type
                    // of extension it is.
                    EXTENSION_INTRODUCER => Ok(ProcessExtension(self.read_byte()?, graphic_control_extension)),
                    IMAGE_DESCRIPTOR_LABEL => Ok(ProcessImageDescriptor(graphic_control_extension)),
                    TRAILER_LABEL => Ok(ProcessTrailer),
                    label => Err(ParserError::UnexpectedLabel(label).into())
                }
            },
            ProcessExtension(label, graphic_control_extension) => {
                self.process_extension(ExtensionType::try_from(label)?, graphic_control_extension)
            },
            ProcessImageDescriptor(graphic_control_extension) => {
                let left_position = self.read_u16()?;
                let top_position = self.read_u16()?;

                let width = self.read_u16()?;
                let height = self.read_u16()?;

                let packed_fields = self.read_byte()?;

                let local_color_table_flag = packed_fields & 0b10000000 != 0;
                let interlace_flag = packed_fields & 0b01000000 != 0;
                let local_color_table_size = if local_color_table_flag {
                    Some(3 * (2_usize << (packed_fields & 0b00000111)))
                } else {
                    None
                };

                let graphic_block = GraphicBlock {
                    extension: graphic_control_extension,
                    descriptor: ImageDescriptor {
                        left_position,
                        top_position,
                        width,
                        height,
                        interlace_flag,
                        local_color_table_size,
                        local_color_table: None,
                    }
                };
                debug!("processed image descriptor, got: {:#?}", graphic_block);

                let next_state = if local_color_table_flag {
                    ProcessLocalColorTable(graphic_block)
                } else {
                    ProcessImageData(graphic_block)
                };

                Ok(next_state)
            },
            ProcessLocalColorTable(mut graphic_block) => {
                let size = graphic_block.descriptor.local_color_table_size.unwrap_or(0);

                graphic_block.descriptor.local_color_table = Some(Rgb::from_table(&self.read_bytes(size)?));

                Ok(ProcessImageData(graphic_block))
            },
            ProcessImageData(graphic_block) => {
                let image_number = self.images_decoded + 1;
                self.process_image_data(graphic_block)
                    .with_context(|| format!("failed to decode image {image_number}"))?;
                self.images_decoded = image_number;

                Ok(DetermineNextBlock(None))
            },
            Done => Ok(Done),
        }
    }

    fn init_canvas(&mut self) -> Result<()> {
        let screen_desc = self
            .logical_screen_descriptor
            .as_ref()
            .ok_or(ParserError::MissingLogicalScreenDescriptor)?;

        let background_index = usize::from(screen_desc.background_color_index);
        self.background = self
            .global_color_table
            .as_ref()
            .and_then(|table| table.get(background_index).copied())
            .unwrap_or(Rgb::BLACK);

        self.canvas = Some(Raster::new(
            screen_desc.screen_width.into(),
            screen_desc.screen_height.into(),
            self.background,
        )?);
        Ok(())
    }

    fn process_image_data(&mut self, graphic_block: GraphicBlock) -> Result<()> {
        let lzw_code_size = self.read_byte()?;
        let descriptor = &graphic_block.descriptor;

        if descriptor.interlace_flag {
            return Err(ParserError::InterlacedImage.into());
        }

        self.dispose_previous()?;

        let region = descriptor.region();
        let canvas = self.canvas.as_mut().ok_or(ParserError::MissingLogicalScreenDescriptor)?;
        if !canvas.contains(&region) {
            return Err(ParserError::ImageOutsideScreen {
                left: region.left,
                top: region.top,
                width: region.width,
                height: region.height,
                screen_width: canvas.width(),
                screen_height: canvas.height(),
            }.into());
        }

        let method = graphic_block
            .extension
            .and_then(|extension| extension.disposal_method)
            .unwrap_or(DisposalMethod::DoNotDispose);
        let previous = (method == DisposalMethod::RestoreToPrevious).then(|| canvas.clone());

        let palette = match (&descriptor.local_color_table, &self.global_color_table) {
            (Some(local), _) => local,
            (None, Some(global)) => global,
            (None, None) => return Err(ParserError::MissingColorTable.into()),
        };
        let transparent_index = graphic_block
            .extension
            .and_then(|extension| extension.transparent_color_index);

        let mut sink = PixelSink::new(canvas, palette).with_transparent_index(transparent_index);
        sink.configure(region.left, region.top, region.width, region.height)?;
        lzw::decode(&mut *self.inner, lzw_code_size, region.pixel_count(), &mut sink)?;

        debug!("decoded image into {:?}, disposal {:?}", region, method);
        self.pending_disposal = Some(PendingDisposal { region, method, previous });
        Ok(())
    }

    fn dispose_previous(&mut self) -> Result<()> {
        let Some(pending) = self.pending_disposal.take() else {
            return Ok(());
        };
        let canvas = self.canvas.as_mut().ok_or(ParserError::MissingLogicalScreenDescriptor)?;

        match (pending.method, pending.previous) {
            (DisposalMethod::RestoreToBackgroundColor, _) => canvas.fill(&pending.region, self.background),
            (DisposalMethod::RestoreToPrevious, Some(previous)) => *canvas = previous,
            _ => {},
        }
        Ok(())
    }

    fn process_extension(
        &mut self,
        label: ExtensionType,
        graphic_control_extension: Option<GraphicControlExtension>,
    ) -> Result<ParserState> {
        use ExtensionType::*;

        debug!("processing extension type: {:?}", label);
        match label {
            Application => {
                self.expect_block_size("application extension", 11)?;
                let application_identifier = self.read_bytes(8)?;
                let application_authentication_code = self.read_bytes(3)?;
                let application_data = self.read_data_sub_blocks()?;

                if application_identifier.as_ref() == b"NETSCAPE" && application_authentication_code.as_ref() == b"2.0" {
                    if application_data.len() != 3 {
                        return Err(
                            ParserError::UnexpectedApplicationDescriptorDataLength {
                                name: String::from_utf8_lossy(&application_identifier).into(),
                                expected: 3,
                                actual: application_data.len()
                            }.into()
                        );
                    }

                    let loop_count = u16::from_le_bytes([application_data[1], application_data[2]]);
                    debug!("animation loop count {loop_count}, the output only holds the composited canvas");
                } else {
                    debug!(
                        "skipped application block {}, {} bytes of data",
                        String::from_utf8_lossy(&application_identifier),
                        application_data.len()
                    );
                }

                Ok(ParserState::DetermineNextBlock(graphic_control_extension))
            },
            Comment => {
                // sequence of data sub-blocks
                let data = self.read_data_sub_blocks()?;
                debug!("processed comment block, got: {}", String::from_utf8_lossy(&data));
                Ok(ParserState::DetermineNextBlock(graphic_control_extension))
            },
            GraphicControl => {
                self.expect_block_size("graphic control extension", 4)?;

                let packed_fields = self.read_byte()?;
                // packed fields definition
                // XXXYYYZW
                // XXX = reserved, not needed
                // YYY = disposal method, indicates what to do with graphic after displaying
                // Z = user input flag
                // W = transparent color flag

                let disposal_method = DisposalMethod::from_u8((packed_fields >> 2) & 0b00000111);
                let transparent_color_flag = packed_fields & 0b00000001 != 0;

                let delay_time = self.read_u16()?;
                let transparent_color_index = self.read_byte()?;

                if self.read_byte()? != BLOCK_TERMINATOR {
                    return Err(ParserError::MissingBlockTerminator("graphic control extension").into());
                }

                let graphic_control_extension = GraphicControlExtension {
                    disposal_method,
                    transparent_color_index: transparent_color_flag.then_some(transparent_color_index),
                };

                debug!("processed GraphicControlExtension: {:#?}, delay {delay_time}", graphic_control_extension);

                Ok(ParserState::DetermineNextBlock(Some(graphic_control_extension)))
            },
            PlainText => {
                // text is not rendered, it still takes the graphic control extension with it
                self.expect_block_size("plain text extension", 12)?;
                self.read_bytes(12)?;
                self.read_data_sub_blocks()?;

                Ok(ParserState::DetermineNextBlock(None))
            },
        }
    }

    fn expect_block_size(&mut self, block: &'static str, expected: u8) -> Result<()> {
        let actual = self.read_byte()?;
        if actual != expected {
            return Err(ParserError::UnexpectedBlockSize { block, expected, actual }.into());
        }
        Ok(())
    }

    fn read_bytes(&mut self, count: usize) -> Result<Box<[u8]>> {
        let mut buffer = vec![0; count];
        self.inner.read_exact(&mut buffer)?;
        Ok(buffer.into_boxed_slice())
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut buffer: [u8; 1] = [0; 1];
        self.inner.read_exact(&mut buffer)?;
        Ok(u8::from_le_bytes(buffer))
    }

    fn read_u16(&mut self) -> Result<u16> {
        // multi-byte numeric fields are ordered with the least significant byte first

        let mut buffer: [u8; 2] = [0; 2];
        self.inner.read_exact(&mut buffer)?;
        Ok(u16::from_le_bytes(buffer))
    }

    fn read_str(&mut self, count: usize) -> Result<Box<str>> {
        let buffer = self.read_bytes(count)?;
        Ok(String::from_utf8(buffer.into_vec())?.into_boxed_str())
    }

    fn read_data_sub_blocks(&mut self) -> Result<Box<[u8]>> {
        let mut block_size = self.read_byte()?;

        // there could be more than one block, but we do know we'll at least have 1 sub-block.
        // allocate capacity to account for it.
        let mut result = Vec::with_capacity(block_size.into());

        // we might have read the block terminator at the end of the while loop, stop right there
        // because we're done.
        while block_size != 0 {
            let mut sub_block_buffer = vec![0; block_size.into()];

            self.inner.read_exact(&mut sub_block_buffer)?;
            result.append(&mut sub_block_buffer);

            block_size = self.read_byte()?;
        }

        Ok(result.into_boxed_slice())
    }
}
