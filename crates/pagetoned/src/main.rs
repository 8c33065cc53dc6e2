use std::io;

use anyhow::{anyhow, Context};
use byteorder::{LittleEndian, WriteBytesExt};
use clap::Parser;
use log::{info, warn, LevelFilter};

use pagetone::{waveform, DetectionService, ToneReceiverBuilder};

mod app;
mod cli;
mod spawner;

use cli::{Args, CliError};

fn main() {
    match pagetoned() {
        Ok(()) => {}
        Err(cli_error) => cli_error.exit(),
    }
}

fn pagetoned() -> Result<(), CliError> {
    // Parse options and start logging
    let args = Args::try_parse()?;
    log_setup(&args);

    // create the detectors
    let rx = ToneReceiverBuilder::new(args.rate)
        .with_configs(args.detect.iter().cloned())
        .build()
        .context("invalid --detect pattern")?;

    let opts = args.transcoder_options();
    let mut svc = DetectionService::from_receiver(rx);
    svc.with_options(opts.clone());

    if args.demo {
        warn!("demonstration (--demo) mode: the following detections are NOT LIVE!");
        let audio = demo_setup(&args, opts.block_len())?;
        svc.start_reader(io::Cursor::new(audio));
    } else if args.raw {
        svc.start_reader(raw_setup(&args)?);
    } else {
        if args.input_is_stdin() {
            refuse_terminal()?;
        }
        info!("detecting from: {}", args.input());
        svc.start_detection(args.input());
    }

    app::run(&args, &mut svc)?;
    Ok(())
}

fn log_setup(args: &Args) {
    if args.quiet {
        // no logging
        return;
    } else if std::env::var_os("RUST_LOG").is_none() {
        // parameter controls
        let log_filter = match args.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            3 | _ => LevelFilter::Trace,
        };

        pretty_env_logger::formatted_builder()
            .filter_module("pagetone", log_filter)
            .filter_module("pagetoned", log_filter)
            .init();
    } else {
        // environment controls
        pretty_env_logger::init();
    }
}

// one synthesized page per --detect pattern, as f32le bytes
fn demo_setup(args: &Args, block_len: usize) -> Result<Vec<u8>, anyhow::Error> {
    let mut out = Vec::new();
    for cfg in &args.detect {
        let page = waveform::synthesize(cfg, args.rate, block_len)
            .with_context(|| format!("unable to synthesize \"{}\"", cfg))?;
        for sa in page {
            out.write_f32::<LittleEndian>(sa)?;
        }
    }
    Ok(out)
}

fn raw_setup(args: &Args) -> Result<Box<dyn io::Read + Send>, anyhow::Error> {
    if args.input_is_stdin() {
        info!("reading raw f32le samples from standard input");
        refuse_terminal()?;
        Ok(Box::new(io::stdin()))
    } else {
        info!("reading raw f32le samples from file: \"{}\"", &args.input);
        Ok(Box::new(
            std::fs::File::open(&args.input)
                .with_context(|| format!("Unable to open --input \"{}\"", args.input))?,
        ))
    }
}

fn refuse_terminal() -> Result<(), anyhow::Error> {
    if is_terminal(&std::io::stdin()) {
        Err(anyhow!(
            "cowardly refusing to read audio from a terminal.

Pipe a source of audio from sox, parec, rtl_fm, or similar into
this program, or give an --input file or URL."
        ))
    } else {
        Ok(())
    }
}

#[cfg(not(target_os = "windows"))]
fn is_terminal<S>(stream: &S) -> bool
where
    S: std::os::fd::AsRawFd,
{
    terminal_size::terminal_size_using_fd(stream.as_raw_fd()).is_some()
}

#[cfg(target_os = "windows")]
fn is_terminal<S>(stream: &S) -> bool
where
    S: std::os::windows::io::AsRawHandle,
{
    terminal_size::terminal_size_using_handle(stream.as_raw_handle()).is_some()
}
