//! Command-line probe for the capture engine.
//!
//! `stdcapture topology` shows how join flags group the four channels;
//! `stdcapture probe` captures the real fd 1 / fd 2 and runtime streams of
//! this process while writing a marker to each, then reports what landed
//! where.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use stdcapture::core::types::{Layer, Side};
use stdcapture::io::config::{CaptureConfig, load_config};
use stdcapture::io::runtime;
use stdcapture::{
    CaptureError, CaptureOutput, JoinFlags, LogicalChannel, Redirect, Topology, exit_codes,
    logging, resolve,
};

#[derive(Parser)]
#[command(
    name = "stdcapture",
    version,
    about = "Capture native and runtime output streams in-process"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the capture groups produced by the join flags.
    Topology {
        #[command(flatten)]
        join: JoinArgs,
    },
    /// Capture every configured channel while writing a marker to each.
    Probe {
        /// TOML capture configuration; missing file means defaults.
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        join: JoinArgs,

        /// Leave this channel untouched (repeatable).
        #[arg(long, value_enum)]
        skip: Vec<ChannelArg>,

        /// Extra bytes written to every channel after its marker.
        #[arg(long, default_value_t = 0)]
        payload_bytes: usize,
    },
}

#[derive(Args, Debug, Default)]
struct JoinArgs {
    /// Capture every channel into its own group.
    #[arg(long)]
    no_join: bool,
    /// Do not join the out side with the err side.
    #[arg(long)]
    no_join_out_err: bool,
    /// Keep native-out and runtime-out apart.
    #[arg(long)]
    no_join_out: bool,
    /// Keep native-err and runtime-err apart.
    #[arg(long)]
    no_join_err: bool,
}

impl JoinArgs {
    fn apply(&self, mut flags: JoinFlags) -> JoinFlags {
        flags.all &= !self.no_join;
        flags.out_err &= !self.no_join_out_err;
        flags.out &= !self.no_join_out;
        flags.err &= !self.no_join_err;
        flags
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ChannelArg {
    NativeOut,
    NativeErr,
    RuntimeOut,
    RuntimeErr,
}

impl From<ChannelArg> for LogicalChannel {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::NativeOut => LogicalChannel::NativeOut,
            ChannelArg::NativeErr => LogicalChannel::NativeErr,
            ChannelArg::RuntimeOut => LogicalChannel::RuntimeOut,
            ChannelArg::RuntimeErr => LogicalChannel::RuntimeErr,
        }
    }
}

/// JSON report printed by `probe`.
#[derive(Serialize)]
struct ProbeReport {
    groups: Topology,
    channels: Vec<ChannelReport>,
    out: Option<String>,
    err: Option<String>,
}

#[derive(Serialize)]
struct ChannelReport {
    channel: LogicalChannel,
    layer: Layer,
    side: Side,
    captured: String,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{:#}", err);
            if err.downcast_ref::<CaptureError>().is_some_and(|err| {
                !matches!(err, CaptureError::Configuration(_))
            }) {
                exit_codes::CAPTURE_FAILED
            } else {
                exit_codes::INVALID
            }
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Topology { join } => cmd_topology(&join),
        Command::Probe {
            config,
            join,
            skip,
            payload_bytes,
        } => cmd_probe(config.as_deref(), &join, &skip, payload_bytes),
    }
}

fn cmd_topology(join: &JoinArgs) -> Result<()> {
    let topology = resolve(join.apply(JoinFlags::default()));
    print_json(&topology)
}

fn cmd_probe(
    config: Option<&std::path::Path>,
    join: &JoinArgs,
    skip: &[ChannelArg],
    payload_bytes: usize,
) -> Result<()> {
    let mut cfg = match config {
        Some(path) => load_config(path)?,
        None => CaptureConfig::default(),
    };
    cfg.join = join.apply(cfg.join);
    cfg.validate()?;

    let mut redirect = cfg.to_redirect();
    for channel in skip.iter().copied().map(LogicalChannel::from) {
        redirect = match channel {
            LogicalChannel::NativeOut => redirect.native_out(None),
            LogicalChannel::NativeErr => redirect.native_err(None),
            LogicalChannel::RuntimeOut => redirect.runtime_out(None),
            LogicalChannel::RuntimeErr => redirect.runtime_err(None),
        };
    }

    let payload = vec![b'x'; payload_bytes];
    let (written, output) =
        redirect.capture(|| write_markers(&payload).and_then(|()| redirect.flush()))?;
    written.context("write probe markers")?;

    print_json(&report(&redirect, &output))
}

/// Write `<channel>\n` plus the payload to every channel, whether captured or not.
fn write_markers(payload: &[u8]) -> std::io::Result<()> {
    for channel in LogicalChannel::ALL {
        let mut bytes = format!("{channel}\n").into_bytes();
        bytes.extend_from_slice(payload);
        match channel {
            LogicalChannel::NativeOut => {
                let mut out = std::io::stdout().lock();
                out.write_all(&bytes)?;
                out.flush()?;
            }
            LogicalChannel::NativeErr => std::io::stderr().lock().write_all(&bytes)?,
            LogicalChannel::RuntimeOut => runtime::stdout().write_all(&bytes)?,
            LogicalChannel::RuntimeErr => runtime::stderr().write_all(&bytes)?,
        }
    }
    Ok(())
}

fn report(redirect: &Redirect, output: &CaptureOutput) -> ProbeReport {
    let lossy = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();
    ProbeReport {
        groups: redirect.topology().clone(),
        channels: output
            .channels()
            .map(|(channel, bytes)| ChannelReport {
                channel,
                layer: channel.layer(),
                side: channel.side(),
                captured: lossy(bytes),
            })
            .collect(),
        out: output.out().map(lossy),
        err: output.err().map(lossy),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_probe_flags() {
        let cli = Cli::parse_from([
            "stdcapture",
            "probe",
            "--no-join-out",
            "--skip",
            "runtime-err",
            "--payload-bytes",
            "10",
        ]);
        match cli.command {
            Command::Probe {
                join,
                skip,
                payload_bytes,
                config,
            } => {
                assert!(join.no_join_out && !join.no_join);
                assert_eq!(skip, vec![ChannelArg::RuntimeErr]);
                assert_eq!(payload_bytes, 10);
                assert!(config.is_none());
            }
            Command::Topology { .. } => panic!("expected probe"),
        }
    }

    #[test]
    fn join_args_only_clear_flags() {
        let args = JoinArgs {
            no_join_err: true,
            ..JoinArgs::default()
        };
        let flags = args.apply(JoinFlags {
            all: true,
            out_err: false,
            out: true,
            err: true,
        });
        assert_eq!(
            flags,
            JoinFlags {
                all: true,
                out_err: false,
                out: true,
                err: false,
            }
        );
    }
}
