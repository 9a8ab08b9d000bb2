use std::path::PathBuf;
use anyhow::{bail, Result};

pub const USAGE: &str = "\
Usage: gif2bmp [-i input.gif] [-o output.bmp] [-l report.log] [-h]

  -i <file>   GIF file to convert, standard input when omitted
  -o <file>   BMP file to write, standard output when omitted
  -l <file>   write input and output sizes to a report file
  -h          print this help

Set RUST_LOG=debug to trace the decoding.";

/// What the command line asked for.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Convert(Config),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Config {
    pub input: Option<PathBuf>,   // None reads standard input
    pub output: Option<PathBuf>,  // None writes standard output
    pub report: Option<PathBuf>,
}

impl Command {
    /// Parses the arguments following the program name.
    pub fn parse(args: &[String]) -> Result<Command> {
        let mut config = Config::default();
        let mut args = args.iter();

        while let Some(arg) = args.next() {
            let slot = match arg.as_str() {
                "-h" | "--help" => return Ok(Command::Help),
                "-i" => &mut config.input,
                "-o" => &mut config.output,
                "-l" => &mut config.report,
                other => bail!("unknown option {other}\n\n{USAGE}"),
            };

            let Some(value) = args.next() else {
                bail!("option {arg} needs a file name");
            };
            if slot.replace(PathBuf::from(value)).is_some() {
                bail!("option {arg} was given more than once");
            }
        }

        Ok(Command::Convert(config))
    }
}
