use shuckle_dns::nameserver::*;
use shuckle_dns::resolver::{load_cache, persist_cache, Cache, CacheConf, Resolver, ResolverParams, TraceParams};
use shuckle_dns::shared::dns;
use shuckle_dns::shared::logs::{init_log, set_max_level};
use shuckle_dns::shared::net::{start_servers, UdpParams};
use colored::Colorize;
use std::sync::Arc;
use std::{env, process, time};

/// Flags accepted on top of the mandatory configuration file path: shorthand
/// overrides layered on top of whatever the config file says.
struct CliArgs {
    config_path: String,
    caching: bool,
    ttl_override: Option<u32>,
    port: Option<u16>,
}

fn main() {
    init_log();

    let cli = match parse_args() {
        Some(v) => v,
        None => {
            print_usage();
            process::exit(1);
        }
    };

    let mut conf = match conf::Conf::from_file(&cli.config_path) {
        Ok(conf) => {
            set_max_level(conf.log_level);
            log::info!("Configuration parsed: {:?}.", conf);
            conf
        }
        Err(err) => {
            log::error!("Parsing configuration file: {}", err);
            process::exit(1);
        }
    };

    if let Some(port) = cli.port {
        conf.udp_server.port = port;
    }
    if let Some(ttl) = cli.ttl_override {
        conf.resolver.cache_conf.override_ttl = Some(ttl.into());
    }

    let zone_file_confs: Vec<ZoneFileConf> = conf
        .zones
        .iter()
        .map(|zone_conf| ZoneFileConf {
            file_path: zone_conf.file.clone(),
            zone: dns::Name::from_string(&zone_conf.zone).unwrap(),
            starting_ttl: zone_conf.starting_ttl,
        })
        .collect();

    let catalog = match parse_zone_files(zone_file_confs) {
        Ok(v) => v,
        Err(err) => {
            log::error!("Parsing zone files: {:?}", err);
            process::exit(1);
        }
    };

    // Instantiate the resolver used to answer queries for names outside every
    // configured zone, when a client sets recursion desired.
    let cache_conf = CacheConf {
        clean_period: time::Duration::new(conf.resolver.cache_conf.clean_period, 0),
        max_cleaned: conf.resolver.cache_conf.entries_cleaned,
        override_ttl: conf.resolver.cache_conf.override_ttl.map(|ttl| time::Duration::new(ttl, 0)),
    };
    let cache = if cli.caching {
        Arc::new(load_cache(&conf.resolver.cache_file, cache_conf))
    } else {
        Arc::new(Cache::new(cache_conf))
    };
    cache.start_clean_routine();

    let resolver_conf = ResolverParams {
        max_ns_queried: conf.resolver.max_ns_queried,
        max_upd_retries: conf.resolver.max_ns_retries,
        max_cname_redir: conf.resolver.max_cname_redir,
        read_timeout: time::Duration::new(conf.resolver.read_timeout, 0),
        write_timeout: time::Duration::new(conf.resolver.write_timeout, 0),
        no_follow_cname: false,
    };
    let trace_conf = TraceParams {
        silent: conf.resolver.trace_conf.silent,
        verbose: conf.resolver.trace_conf.verbose,
        color: conf.resolver.trace_conf.color,
    };
    let resolver = Resolver::new(&cache, resolver_conf, trace_conf);

    // Instantiate the nameserver handler and start the server. This call
    // blocks until the server is shut down.
    let nameserver_handler = NameserverHandler::new(catalog, resolver);
    let nameserver_handler_arc = Arc::new(nameserver_handler);

    let udp_params = UdpParams {
        address: conf.udp_server.address,
        port: conf.udp_server.port,
        write_timeout: time::Duration::new(conf.udp_server.write_timeout, 0),
        threads: conf.udp_server.threads,
    };

    start_servers(nameserver_handler_arc, udp_params);

    if cli.caching {
        persist_cache(&cache, &conf.resolver.cache_file);
    }
}

/// Parse the flags accepted on top of the mandatory config file path:
/// `[-c] [-t TTL] [-p PORT] <config-file>`.
fn parse_args() -> Option<CliArgs> {
    let raw: Vec<String> = env::args().skip(1).collect();
    let mut config_path = None;
    let mut caching = false;
    let mut ttl_override = None;
    let mut port = None;

    let mut i = 0;
    while i < raw.len() {
        match raw[i].as_str() {
            "-c" => caching = true,
            "-t" => {
                i += 1;
                ttl_override = Some(raw.get(i)?.parse().ok()?);
            }
            "-p" => {
                i += 1;
                port = Some(raw.get(i)?.parse().ok()?);
            }
            other if config_path.is_none() => config_path = Some(other.to_string()),
            _ => return None,
        }
        i += 1;
    }

    Some(CliArgs {
        config_path: config_path?,
        caching,
        ttl_override,
        port,
    })
}

fn print_usage() {
    log::error!(
        "Usage: {} [-c] [-t TTL] [-p PORT] {}",
        "path/to/nameserver/binary".bold(),
        "path/to/config/file".bold().bright_green()
    )
}
