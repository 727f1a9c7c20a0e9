//! Streamify CLI
//!
//! Streams a file (or stdin) to a WebDAV server without buffering it in memory.

use bytesize::ByteSize;
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use streamify::{upload_reader, ChannelConfig, StreamingRequest, WebDavChannel};

fn cli() -> Command {
    Command::new("streamify")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Stream content to a WebDAV server")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Verbose output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("upload")
                .about("Upload a file, or stdin when no file is given")
                .arg(
                    Arg::new("base-url")
                        .help("WebDAV base URL (overrides the config file)")
                        .long("base-url"),
                )
                .arg(
                    Arg::new("identifier")
                        .help("Destination path below the base URL")
                        .required(true),
                )
                .arg(Arg::new("file").help("File to upload; '-' or nothing reads stdin"))
                .arg(
                    Arg::new("config")
                        .long("config")
                        .help("JSON channel configuration file"),
                )
                .arg(Arg::new("username").long("username").short('u'))
                .arg(Arg::new("password").long("password").short('p'))
                .arg(
                    Arg::new("content-type")
                        .long("content-type")
                        .default_value("application/octet-stream"),
                )
                .arg(
                    Arg::new("buffer-size")
                        .long("buffer-size")
                        .help("Pipe capacity in bytes")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("gzip")
                        .long("gzip")
                        .help("Gzip the content")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("zip-entry")
                        .long("zip-entry")
                        .help("Wrap the content in a zip archive with this entry name"),
                ),
        )
}

fn channel_config(matches: &ArgMatches) -> streamify::Result<ChannelConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ChannelConfig::from_json_file(path)?,
        None => {
            let base_url = matches.get_one::<String>("base-url").ok_or_else(|| {
                streamify::StreamifyError::config_error("Either --config or --base-url is required")
            })?;
            ChannelConfig::new(base_url.clone())
        }
    };

    if let Some(base_url) = matches.get_one::<String>("base-url") {
        config.base_url = base_url.clone();
    }
    if let Some(username) = matches.get_one::<String>("username") {
        let password = matches.get_one::<String>("password").cloned().unwrap_or_default();
        config = config.credentials(username.clone(), password);
    }
    Ok(config)
}

fn streaming_request(matches: &ArgMatches, identifier: &str) -> streamify::Result<StreamingRequest> {
    let content_type = matches
        .get_one::<String>("content-type")
        .map(String::as_str)
        .unwrap_or("application/octet-stream");

    let mut request = StreamingRequest::new(identifier, content_type);
    if let Some(size) = matches.get_one::<usize>("buffer-size") {
        request = request.buffer_size(*size);
    }
    if matches.get_flag("gzip") {
        request = request.gzip();
    }
    if let Some(entry) = matches.get_one::<String>("zip-entry") {
        request = request.zip_entry(entry.clone())?;
    }
    Ok(request)
}

fn open_input(file: Option<&String>) -> io::Result<Box<dyn Read>> {
    match file.map(String::as_str) {
        None | Some("-") => Ok(Box::new(io::stdin().lock())),
        Some(path) => Ok(Box::new(File::open(Path::new(path))?)),
    }
}

fn upload(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let identifier = matches
        .get_one::<String>("identifier")
        .ok_or("Missing identifier")?;

    let channel = WebDavChannel::new(channel_config(matches)?)?;
    let request = streaming_request(matches, identifier)?;
    let input = open_input(matches.get_one::<String>("file"))?;

    info!("Streaming to {}{}", channel.base_url(), identifier);
    let report = upload_reader(&channel, &request, identifier, input)?;

    println!(
        "Uploaded {} to {} (status {}, {} ms)",
        ByteSize::b(report.bytes_sent),
        report.url,
        report.status,
        report.duration_ms
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = cli().get_matches();

    let level = if matches.get_flag("verbose") {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    match matches.subcommand() {
        Some(("upload", sub_matches)) => upload(sub_matches)?,
        _ => {
            eprintln!("No subcommand provided. Use --help for usage information.");
            std::process::exit(1);
        }
    }

    Ok(())
}
