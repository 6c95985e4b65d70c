//! Command-line arguments.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use relay_ipc::StreamTarget;

pub const USAGE: &str = "\
usage: frame-relay <target> --input FILE [options]

targets:
  udp <host> <port>      one datagram per frame
  tcp <host> <port>      frames over one TCP connection
  rtmp <url>             publish to rtmp://host[:port]/app/key

options:
  --input FILE           file to read frames from
  --config FILE          JSON relay configuration
  --chunk BYTES          bytes per frame (default 1316)
  --interval-ms MS       pause between frames (default 5)
  --loop                 restart the input at end of file
  -h, --help             show this help";

/// Parsed invocation.
#[derive(Debug, Default, PartialEq)]
pub struct Args {
    pub target: Option<StreamTarget>,
    pub input: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub chunk_size: Option<usize>,
    pub interval_ms: Option<u64>,
    pub looping: bool,
    pub help: bool,
}

impl Args {
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut parsed = Args::default();
        let mut positional = Vec::new();

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--input" => parsed.input = Some(PathBuf::from(value(args, &mut i)?)),
                "--config" => parsed.config = Some(PathBuf::from(value(args, &mut i)?)),
                "--chunk" => {
                    let raw = value(args, &mut i)?;
                    let chunk: usize = raw
                        .parse()
                        .with_context(|| format!("invalid --chunk {raw:?}"))?;
                    if chunk == 0 {
                        bail!("--chunk must be greater than zero");
                    }
                    parsed.chunk_size = Some(chunk);
                }
                "--interval-ms" => {
                    let raw = value(args, &mut i)?;
                    parsed.interval_ms = Some(
                        raw.parse()
                            .with_context(|| format!("invalid --interval-ms {raw:?}"))?,
                    );
                }
                "--loop" => parsed.looping = true,
                "-h" | "--help" | "help" => parsed.help = true,
                flag if flag.starts_with("--") => bail!("unknown option {flag:?}"),
                other => positional.push(other.to_string()),
            }
            i += 1;
        }

        if parsed.help {
            return Ok(parsed);
        }

        parsed.target = Some(parse_target(&positional)?);
        if parsed.input.is_none() {
            bail!("--input is required");
        }
        Ok(parsed)
    }
}

fn value<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str> {
    let flag = &args[*i];
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{flag} needs a value"))
}

fn parse_target(positional: &[String]) -> Result<StreamTarget> {
    let Some(kind) = positional.first() else {
        bail!("missing target (udp, tcp or rtmp)");
    };

    match (kind.as_str(), &positional[1..]) {
        ("udp", [host, port]) => Ok(StreamTarget::Udp {
            host: host.clone(),
            port: parse_port(port)?,
        }),
        ("tcp", [host, port]) => Ok(StreamTarget::Tcp {
            host: host.clone(),
            port: parse_port(port)?,
        }),
        ("rtmp", [url]) => Ok(StreamTarget::Rtmp { url: url.clone() }),
        ("udp" | "tcp", _) => bail!("usage: frame-relay {kind} <host> <port>"),
        ("rtmp", _) => bail!("usage: frame-relay rtmp <url>"),
        (other, _) => bail!("unknown target {other:?}"),
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    match raw.parse::<u16>() {
        Ok(0) => bail!("port must be between 1 and 65535"),
        Ok(port) => Ok(port),
        Err(_) => bail!("invalid port {raw:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_udp_target_with_options() {
        let parsed =
            Args::parse(&args("udp 10.0.0.5 5000 --input in.ts --chunk 188 --interval-ms 2 --loop"))
                .unwrap();

        assert_eq!(
            parsed.target,
            Some(StreamTarget::Udp {
                host: "10.0.0.5".into(),
                port: 5000
            })
        );
        assert_eq!(parsed.input, Some(PathBuf::from("in.ts")));
        assert_eq!(parsed.chunk_size, Some(188));
        assert_eq!(parsed.interval_ms, Some(2));
        assert!(parsed.looping);
    }

    #[test]
    fn test_rtmp_target() {
        let parsed = Args::parse(&args("--input a.h264 rtmp rtmp://host/live/key")).unwrap();
        assert_eq!(
            parsed.target,
            Some(StreamTarget::Rtmp {
                url: "rtmp://host/live/key".into()
            })
        );
    }

    #[test]
    fn test_help_skips_validation() {
        assert!(Args::parse(&args("--help")).unwrap().help);
    }

    #[rstest]
    #[case::no_target("--input a.ts")]
    #[case::no_input("udp 127.0.0.1 5000")]
    #[case::port_zero("udp 127.0.0.1 0 --input a.ts")]
    #[case::port_range("tcp 127.0.0.1 70000 --input a.ts")]
    #[case::missing_port("tcp 127.0.0.1 --input a.ts")]
    #[case::unknown_kind("srt 127.0.0.1 5000 --input a.ts")]
    #[case::zero_chunk("udp 127.0.0.1 5000 --input a.ts --chunk 0")]
    #[case::dangling_flag("udp 127.0.0.1 5000 --input")]
    #[case::unknown_flag("udp 127.0.0.1 5000 --input a.ts --fast")]
    fn test_rejected(#[case] line: &str) {
        assert!(Args::parse(&args(line)).is_err());
    }
}
