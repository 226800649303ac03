use std::{env, process::ExitCode, time::Duration};

use getopts::Options;
use graphite_client::{GraphiteBuilder, MetricValue, Transport};
use tracing::Level;

fn opts() -> Options {
    let mut opts = Options::new();
    opts.optopt("s", "server", "hostname of the Graphite server to send to, default localhost", "HOST");
    opts.optopt("p", "port", "port to send the metric to, default 2003", "PORT");
    opts.optflag("u", "udp", "send via UDP instead of TCP");
    opts.optopt("t", "timestamp", "Unix timestamp for the metric, defaults to the current time", "SECS");
    opts.optopt("", "prefix", "prefix to prepend to the metric path", "PREFIX");
    opts.optmulti("", "tag", "tag to attach to the metric, repeatable", "NAME=VALUE");
    opts.optopt("", "timeout", "connect/send timeout in seconds, default 5", "SECS");
    opts.optflag("q", "quiet", "quiet mode (don't log the send)");
    opts.optflag("h", "help", "print this help menu");
    opts
}

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {program} [options] METRIC VALUE");
    print!("{}", opts.usage(&brief));
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let program = &args[0];
    let opts = opts();

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{program}: {e}");
            return ExitCode::FAILURE;
        }
    };

    if matches.opt_present("help") {
        print_usage(program, &opts);
        return ExitCode::SUCCESS;
    }

    let quiet = matches.opt_present("quiet");
    if !quiet {
        tracing_subscriber::fmt().with_max_level(Level::INFO).init();
    }

    let (metric, raw_value) = match &matches.free[..] {
        [metric, value] => (metric.clone(), value.clone()),
        _ => {
            print_usage(program, &opts);
            return ExitCode::FAILURE;
        }
    };

    // Integer values render without a decimal point, so try integer first.
    let value = match raw_value.parse::<i64>().map(MetricValue::from) {
        Ok(value) => value,
        Err(_) => match raw_value.parse::<f64>() {
            Ok(value) => MetricValue::from(value),
            Err(_) => {
                eprintln!("{program}: VALUE must be numeric, got {raw_value:?}");
                return ExitCode::FAILURE;
            }
        },
    };

    let server = matches.opt_str("server").unwrap_or_else(|| "localhost".to_string());

    let port = match matches.opt_str("port").map(|p| p.parse::<u16>()).transpose() {
        Ok(port) => port.unwrap_or(2003),
        Err(e) => {
            eprintln!("{program}: invalid port: {e}");
            return ExitCode::FAILURE;
        }
    };

    let timestamp = match matches.opt_str("timestamp").map(|t| t.parse::<u64>()).transpose() {
        Ok(timestamp) => timestamp,
        Err(e) => {
            eprintln!("{program}: invalid timestamp: {e}");
            return ExitCode::FAILURE;
        }
    };

    let timeout = match matches.opt_str("timeout").map(|t| t.parse::<u64>()).transpose() {
        Ok(timeout) => Duration::from_secs(timeout.unwrap_or(5)),
        Err(e) => {
            eprintln!("{program}: invalid timeout: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut tags = Vec::new();
    for raw_tag in matches.opt_strs("tag") {
        match raw_tag.split_once('=') {
            Some((name, value)) => tags.push((name.to_string(), value.to_string())),
            None => {
                eprintln!("{program}: invalid tag {raw_tag:?}, expected NAME=VALUE");
                return ExitCode::FAILURE;
            }
        }
    }

    let mut builder = GraphiteBuilder::new(server)
        .with_port(port)
        .with_timeout(timeout)
        .log_sends(!quiet);
    if matches.opt_present("udp") {
        builder = builder.with_transport(Transport::Udp);
    }
    if let Some(prefix) = matches.opt_str("prefix") {
        builder = builder.with_prefix(prefix);
    }

    // No flush interval: the sender is synchronous, so the one send below transmits inline
    // before the process exits.
    let sender = match builder.build() {
        Ok(sender) => sender,
        Err(e) => {
            eprintln!("{program}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let borrowed_tags: Vec<(&str, &str)> =
        tags.iter().map(|(name, value)| (name.as_str(), value.as_str())).collect();

    if let Err(e) = sender.send_with(&metric, value, timestamp, &borrowed_tags) {
        eprintln!("{program}: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
