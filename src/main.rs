use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches, Command};
use gjallar::client::DnsClient;
use gjallar::config::ResolverConfig;
use gjallar::dns::enums::RecordType;
use gjallar::error::{ClientError, ConfigError};
use gjallar::tsig::TsigAlgorithm;

const DEFAULT_RESOLV_CONF: &str = "/etc/resolv.conf";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let matches = Command::new("gjallar")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Query a nameserver and verify the keyed authentication record on the response")
        .arg(
            Arg::new("qname")
                .required(true)
                .help("The domain name to query for"),
        )
        .arg(
            Arg::new("type")
                .short('t')
                .long("type")
                .value_name("TYPE")
                .default_value("A")
                .help("Record type to query (A, AAAA, CNAME, MX, NS, TXT, SOA, PTR, SRV, ANY)"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("The remote port to send the query to (default 53)"),
        )
        .arg(
            Arg::new("no-auth")
                .long("no-auth")
                .action(ArgAction::SetTrue)
                .help("Do not request or verify response authentication"),
        )
        .arg(
            Arg::new("config")
                .short('f')
                .long("config")
                .value_name("FILE")
                .help("Resolver file with the address to connect to; same format as /etc/resolv.conf (defaults to that file)"),
        )
        .arg(
            Arg::new("server")
                .short('s')
                .long("server")
                .value_name("ADDRESS")
                .help("Nameserver address, bypassing the resolver file"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .help("Per-attempt timeout in seconds (default 5)"),
        )
        .arg(
            Arg::new("key-name")
                .long("key-name")
                .value_name("NAME")
                .help("Shared authentication key name"),
        )
        .arg(
            Arg::new("key-secret")
                .long("key-secret")
                .value_name("BASE64")
                .help("Shared authentication key secret, base64 encoded"),
        )
        .arg(
            Arg::new("key-algorithm")
                .long("key-algorithm")
                .value_name("ALG")
                .help("hmac-sha256 (default), hmac-sha384 or hmac-sha512"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the decoded response as JSON"),
        )
        .get_matches();

    match run(&matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(matches: &ArgMatches) -> Result<(), ClientError> {
    let qname = matches.get_one::<String>("qname").expect("qname is required");
    if qname != "." && qname.trim_end_matches('.').split('.').any(str::is_empty) {
        return Err(ClientError::Usage(format!("invalid query name: {}", qname)));
    }
    let qtype: RecordType = matches
        .get_one::<String>("type")
        .expect("type has a default")
        .parse()
        .map_err(ClientError::Usage)?;

    let config = build_config(matches)?;
    let authenticate = config.require_authentication;

    let client = DnsClient::new(config);
    let response = client.lookup(qname, qtype).await?;

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&response.message)?);
    } else {
        print!("{}", response.message);
    }
    if authenticate {
        match response.auth {
            Some(outcome) => println!("\n;; authentication: {}", outcome),
            None => println!("\n;; authentication: not attempted (no key material configured)"),
        }
    }

    Ok(())
}

/// Layer the configuration: resolver file (or `--server`), then `GJALLAR_*`
/// environment overrides, then command-line flags.
fn build_config(matches: &ArgMatches) -> Result<ResolverConfig, ClientError> {
    let mut config = if let Some(server) = matches.get_one::<String>("server") {
        ResolverConfig {
            server: server
                .parse()
                .map_err(|_| ConfigError::InvalidServerAddress(server.clone()))?,
            ..ResolverConfig::default()
        }
    } else {
        let path = match matches.get_one::<String>("config") {
            Some(path) => path.as_str(),
            None => {
                println!(
                    "Warning: no resolver file specified, using {}",
                    DEFAULT_RESOLV_CONF
                );
                DEFAULT_RESOLV_CONF
            }
        };
        ResolverConfig::from_resolv_conf(Path::new(path))?
    };

    config.apply_env().map_err(ClientError::Config)?;

    if let Some(port) = matches.get_one::<String>("port") {
        config.port = port
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
    }
    if let Some(secs) = matches.get_one::<String>("timeout") {
        let parsed = secs
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidTimeout(secs.clone()))?;
        if parsed == 0 {
            return Err(ConfigError::InvalidTimeout(secs.clone()).into());
        }
        config.timeout = Duration::from_secs(parsed);
    }
    if let Some(name) = matches.get_one::<String>("key-name") {
        config.key_name = Some(name.clone());
    }
    if let Some(secret) = matches.get_one::<String>("key-secret") {
        config.key_secret = Some(secret.clone());
    }
    if let Some(algorithm) = matches.get_one::<String>("key-algorithm") {
        config.algorithm = TsigAlgorithm::from_name(algorithm)
            .ok_or_else(|| ConfigError::UnknownAlgorithm(algorithm.clone()))?;
    }
    if matches.get_flag("no-auth") {
        config.require_authentication = false;
    }

    Ok(config)
}
