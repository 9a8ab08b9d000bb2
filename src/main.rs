use std::fmt;
use std::fs::{self, File};
use std::io::{self, prelude::*, BufWriter};
use anyhow::{Context, Result};
use log::{debug, info};

mod bmp_writer;
mod config;
mod parser;
mod raster;

use config::{Command, Config, USAGE};
use parser::Decoder;
use raster::Raster;

/// Sizes of one conversion, in bytes.
#[derive(Debug, PartialEq, Eq)]
struct Report {
    gif_size: u64,
    bmp_size: u64,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "uncodedSize = {}", self.gif_size)?;
        writeln!(f, "codedSize = {}", self.bmp_size)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match Command::parse(&args)? {
        Command::Help => {
            println!("{USAGE}");
            Ok(())
        },
        Command::Convert(config) => run(&config),
    }
}

fn run(config: &Config) -> Result<()> {
    let gif = match &config.input {
        Some(path) => fs::read(path).with_context(|| format!("can not read {}", path.display()))?,
        None => {
            let mut buffer = Vec::new();
            io::stdin().lock().read_to_end(&mut buffer).context("can not read standard input")?;
            buffer
        },
    };

    // nothing is written unless the whole file decoded
    let canvas = decode(&gif)?;

    let bmp_size = match &config.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("can not create {}", path.display()))?;
            write_output(BufWriter::new(file), &canvas)?
        },
        None => write_output(BufWriter::new(io::stdout().lock()), &canvas)?,
    };

    let report = Report {
        gif_size: gif.len() as u64,
        bmp_size,
    };
    info!("converted {} GIF bytes into {} BMP bytes", report.gif_size, report.bmp_size);

    if let Some(path) = &config.report {
        fs::write(path, report.to_string()).with_context(|| format!("can not write {}", path.display()))?;
    }
    Ok(())
}

fn decode(gif: &[u8]) -> Result<Raster> {
    let mut input = gif;
    let mut decoder = Decoder::new(&mut input);
    decoder.parse()?;

    let images = decoder.images_decoded();
    let canvas = decoder.into_canvas()?;
    debug!("composited {images} images, {} trailing bytes ignored", input.len());
    Ok(canvas)
}

fn write_output<W: Write>(mut writer: W, canvas: &Raster) -> Result<u64> {
    let written = bmp_writer::write_bmp(&mut writer, canvas)?;
    writer.flush().context("can not write the BMP output")?;
    Ok(written)
}
