use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use pvcs_format::{Descriptor, DescriptorDecoder, DescriptorType, FormatResult};

use crate::cli::*;
use crate::config::CliConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    match cli.command {
        Command::Encode(args) => cmd_encode(args, cli.format),
        Command::Decode(args) => cmd_decode(args, &config, cli.format),
        Command::Check(args) => cmd_check(args, &config, cli.format),
    }
}

fn cmd_encode(args: EncodeArgs, format: OutputFormat) -> anyhow::Result<()> {
    let descriptor = Descriptor::new(args.object, args.kind, args.name)?;
    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    let written = descriptor.write_to(&mut out)?;
    out.flush()?;
    tracing::debug!(bytes = written, "wrote descriptor");

    // stdout may carry the descriptor itself, so status goes to stderr.
    if let Some(status) = encode_status(format, written, args.output.as_deref()) {
        eprintln!("{status}");
    }
    Ok(())
}

fn encode_status(format: OutputFormat, written: usize, output: Option<&Path>) -> Option<String> {
    match format {
        OutputFormat::Json => Some(
            serde_json::json!({
                "bytes": written,
                "output": output.map(|p| p.display().to_string()),
            })
            .to_string(),
        ),
        OutputFormat::Text => output.map(|path| {
            format!(
                "{} Wrote {} bytes to {}",
                "✓".green().bold(),
                written,
                path.display().to_string().bold()
            )
        }),
    }
}

fn cmd_decode(args: DecodeArgs, config: &CliConfig, format: OutputFormat) -> anyhow::Result<()> {
    let decoder = DescriptorDecoder::new(config.decode_config(&args.limits));
    let mut input = open_input(args.input.as_deref())?;
    let mut out = io::stdout().lock();
    let count = decode_stream(&decoder, &mut input, |descriptor| {
        write_descriptor_line(&mut out, &descriptor, format)
    })
    .with_context(|| format!("failed to decode {}", source_label(args.input.as_deref())))?;
    tracing::debug!(count, "decoded stream");
    Ok(())
}

fn write_descriptor_line(out: &mut impl Write, descriptor: &Descriptor, format: OutputFormat) -> io::Result<()> {
    match format {
        OutputFormat::Text => writeln!(out, "{}", render_text(descriptor)),
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(descriptor)?),
    }
}

fn cmd_check(args: CheckArgs, config: &CliConfig, format: OutputFormat) -> anyhow::Result<()> {
    let decoder = DescriptorDecoder::new(config.decode_config(&args.limits));
    let mut input = open_input(args.input.as_deref())?;
    let source = source_label(args.input.as_deref());
    let report = check_stream(&decoder, &mut input)?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "source": source,
                "valid": report.error.is_none(),
                "count": report.valid,
                "error": report.error.as_ref().map(|e| e.to_string()),
            })
        ),
        OutputFormat::Text => match &report.error {
            None => println!(
                "{} {}: {} valid descriptor(s)",
                "✓".green().bold(),
                source.bold(),
                report.valid
            ),
            Some(e) => println!(
                "{} {}: descriptor #{} is invalid: {}",
                "✗".red().bold(),
                source.bold(),
                report.valid + 1,
                e
            ),
        },
    }

    match report.error {
        Some(e) => Err(anyhow::Error::new(e).context(format!("{source} is not a valid descriptor stream"))),
        None => Ok(()),
    }
}

/// Outcome of checking a stream: how many descriptors passed before the first failure.
#[derive(Debug)]
pub struct CheckReport {
    pub valid: usize,
    pub error: Option<pvcs_format::FormatError>,
}

/// Decode descriptors back-to-back until the input is exhausted, handing
/// each one to `emit` as soon as it is decoded. Returns the number emitted.
///
/// Stops at the first malformed descriptor; everything before it has
/// already been emitted.
pub fn decode_stream<F>(decoder: &DescriptorDecoder, reader: &mut impl BufRead, mut emit: F) -> FormatResult<usize>
where
    F: FnMut(Descriptor) -> io::Result<()>,
{
    let mut count = 0;
    while !reader.fill_buf()?.is_empty() {
        emit(decoder.decode(reader)?)?;
        count += 1;
    }
    Ok(count)
}

/// Like [`decode_stream`], but a malformed descriptor is reported rather than
/// returned as an error. Channel I/O errors still propagate.
pub fn check_stream(decoder: &DescriptorDecoder, reader: &mut impl BufRead) -> io::Result<CheckReport> {
    let mut valid = 0;
    while !reader.fill_buf()?.is_empty() {
        match decoder.decode(reader) {
            Ok(_) => valid += 1,
            Err(pvcs_format::FormatError::Io(e)) => return Err(e),
            Err(e) => return Ok(CheckReport { valid, error: Some(e) }),
        }
    }
    Ok(CheckReport { valid, error: None })
}

fn render_text(descriptor: &Descriptor) -> String {
    let kind = match descriptor.descriptor_type() {
        DescriptorType::File => "file  ".normal(),
        DescriptorType::Folder => "folder".blue(),
    };
    format!("{} {} {}", kind, descriptor.object_name().yellow(), descriptor.name().bold())
}

fn open_input(path: Option<&Path>) -> anyhow::Result<Box<dyn BufRead>> {
    match path {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(io::stdin().lock())),
    }
}

fn source_label(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "<stdin>".into())
}
