use shuckle_dns::resolver::*;
use shuckle_dns::shared::dns;
use shuckle_dns::shared::logs::init_log;
use std::sync::Arc;
use std::{env, process, time};

const CACHE_PATH: &str = "client_cache";
const DEFAULT_TIMEOUT: u64 = 2;

struct Args {
    hostname: String,
    timeout: u64,
    caching: bool,
    ttl: Option<u32>,
}

fn main() {
    init_log();

    let args = match parse_args() {
        Some(v) => v,
        None => {
            print_usage();
            process::exit(0);
        }
    };

    let node = normalize_hostname(&args.hostname);

    let cache_conf = CacheConf {
        clean_period: time::Duration::new(300, 0),
        max_cleaned: 100,
        override_ttl: args.ttl.map(|ttl| time::Duration::new(ttl.into(), 0)),
    };
    let cache = if args.caching {
        Arc::new(load_cache(CACHE_PATH, cache_conf))
    } else {
        Arc::new(Cache::new(cache_conf))
    };

    let resolver_conf = ResolverParams {
        read_timeout: time::Duration::new(args.timeout, 0),
        write_timeout: time::Duration::new(args.timeout, 0),
        ..ResolverParams::default()
    };
    let resolver = Resolver::new(&cache, resolver_conf, TraceParams::default());

    let lookup = resolver.new_lookup(&node, dns::RecordType::A);
    let (lookup_result, _trace) = lookup.perform();

    let (aliases, addresses) = match lookup_result {
        Err(err) => {
            log::error!("Resolving '{}': {:?}", node, err);
            (vec![], vec![])
        }
        Ok(LookupResponse(answers, _, _, not_found)) if not_found => {
            log::warn!("'{}' not found.", node);
            let _ = answers;
            (vec![], vec![])
        }
        Ok(LookupResponse(answers, _, _, _)) => split_chain(&answers),
    };

    if args.caching {
        persist_cache(&cache, CACHE_PATH);
    }

    println!("{}", node);
    println!("{}", aliases.join(", "));
    println!("{}", addresses.join(", "));
}

/// Split the answer chain returned by a lookup into the alias names (the
/// owner of each `CNAME` record followed along the way) and the final
/// dotted-quad addresses.
fn split_chain(answers: &[dns::Record]) -> (Vec<String>, Vec<String>) {
    let mut aliases = vec![];
    let mut addresses = vec![];
    for record in answers {
        match record {
            dns::Record::CNAME { name, .. } => aliases.push(name.to_string()),
            dns::Record::A { address, .. } => {
                addresses.push(format!("{}.{}.{}.{}", address[0], address[1], address[2], address[3]))
            }
            _ => {}
        }
    }
    (aliases, addresses)
}

/// Accept a hostname typed without a trailing dot, turning it into the
/// absolute domain name the rest of the crate requires.
fn normalize_hostname(raw: &str) -> dns::Name {
    let absolute = if raw.ends_with('.') { raw.to_string() } else { format!("{}.", raw) };
    match dns::Name::from_string(&absolute) {
        Ok(name) => name,
        Err(err) => {
            log::error!("Invalid hostname '{}': {:?}", raw, err);
            process::exit(1);
        }
    }
}

fn parse_args() -> Option<Args> {
    let raw: Vec<String> = env::args().skip(1).collect();
    let mut hostname = None;
    let mut timeout = DEFAULT_TIMEOUT;
    let mut caching = false;
    let mut ttl = None;

    let mut i = 0;
    while i < raw.len() {
        match raw[i].as_str() {
            "--timeout" => {
                i += 1;
                timeout = raw.get(i)?.parse().ok()?;
            }
            "-c" => caching = true,
            "-t" => {
                i += 1;
                ttl = Some(raw.get(i)?.parse().ok()?);
            }
            other if hostname.is_none() => hostname = Some(other.to_string()),
            _ => return None,
        }
        i += 1;
    }

    Some(Args {
        hostname: hostname?,
        timeout,
        caching,
        ttl,
    })
}

fn print_usage() {
    log::error!("Usage: client <hostname> [--timeout SEC] [-c] [-t TTL]");
}
