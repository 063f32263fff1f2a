use serde::{Deserialize, Serialize};
use std::fs;
use std::net;
use std::str::FromStr;

/// Configuration values obtained parsing the configuration file.
#[derive(Debug, Serialize, Deserialize)]
pub struct Conf {
    pub log_level: log::Level,
    pub udp_server: UdpServerConf,
    pub resolver: ResolverConf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UdpServerConf {
    pub address: String,
    pub port: u16,
    pub write_timeout: u64,
    pub threads: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolverConf {
    pub max_ns_queried: usize,
    pub max_ns_retries: usize,
    pub max_cname_redir: usize,
    pub read_timeout: u64,
    pub write_timeout: u64,
    /// Path used to persist/load the record cache across restarts, when enabled.
    pub cache_file: String,
    pub cache_conf: CacheConf,
    pub trace_conf: TraceConf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheConf {
    pub clean_period: u64,
    pub entries_cleaned: u64,
    /// When set, overrides the TTL of every record inserted into the cache,
    /// in seconds. Layered over by the `-t` CLI flag on both binaries.
    #[serde(default)]
    pub override_ttl: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TraceConf {
    pub silent: bool,
    pub verbose: bool,
    pub color: bool,
}

impl Conf {
    /// Read and parse the configuration values from a file. The file must
    /// be JSON-encoded and follow the organization of the [Conf] struct.
    pub fn from_file(path: &str) -> Result<Self, String> {
        let file_bytes = match fs::read_to_string(path) {
            Err(err) => return Err(err.to_string()),
            Ok(v) => v,
        };
        let conf = match serde_json::from_str::<Conf>(&file_bytes) {
            Err(err) => return Err(err.to_string()),
            Ok(conf) => conf,
        };
        match conf.validate() {
            Ok(_) => Ok(conf),
            Err(err) => Err(err),
        }
    }

    /// Validate a configuration struct against some common errors.
    fn validate(&self) -> Result<(), String> {
        // Udp server confs.
        if let Err(err) = net::IpAddr::from_str(self.udp_server.address.as_ref()) {
            return Err(format!("invalid udp address: {}", err));
        }
        if self.udp_server.write_timeout == 0 {
            return Err("invalid udp write timeout: 0 seconds".to_string());
        }
        if self.udp_server.threads == 0 {
            return Err("invalid udp threads: 0".to_string());
        }

        self.resolver.validate()
    }
}

impl ResolverConf {
    /// Validate the resolver-specific slice of a configuration struct.
    /// Shared by both the standalone resolver and the nameserver's embedded
    /// resolver, since each carries its own [`ResolverConf`].
    pub fn validate(&self) -> Result<(), String> {
        if self.max_ns_queried == 0 {
            return Err("invalid 'max_ns_queried' resolver param: cannot be 0".to_string());
        }
        if self.max_ns_retries == 0 {
            return Err("invalid 'max_ns_retries' resolver param: cannot be 0".to_string());
        }
        if self.max_cname_redir == 0 {
            return Err("invalid 'max_cname_redir' resolver param: cannot be 0".to_string());
        }
        if self.read_timeout == 0 || self.write_timeout == 0 {
            return Err("invalid resolver write/read timeouts: cannot be 0".to_string());
        }

        // Cache confs.
        if self.cache_conf.clean_period == 0 {
            return Err("invalid 'clean_period' cache param: cannot be 0".to_string());
        }
        if self.cache_conf.entries_cleaned == 0 {
            return Err("invalid 'entries_cleaned' cache param: cannot be 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_resolver_conf() -> ResolverConf {
        ResolverConf {
            max_ns_queried: 3,
            max_ns_retries: 3,
            max_cname_redir: 10,
            read_timeout: 2,
            write_timeout: 2,
            cache_file: "resolver_cache".to_string(),
            cache_conf: CacheConf { clean_period: 60, entries_cleaned: 500, override_ttl: None },
            trace_conf: TraceConf { silent: false, verbose: false, color: true },
        }
    }

    fn valid_conf() -> Conf {
        Conf {
            log_level: log::Level::Info,
            udp_server: UdpServerConf {
                address: "0.0.0.0".to_string(),
                port: 53,
                write_timeout: 2,
                threads: 4,
            },
            resolver: valid_resolver_conf(),
        }
    }

    #[test]
    fn valid_conf_passes_validation() {
        assert!(valid_conf().validate().is_ok());
    }

    #[test]
    fn rejects_invalid_udp_address() {
        let mut conf = valid_conf();
        conf.udp_server.address = "not-an-ip".to_string();
        assert!(conf.validate().is_err());
    }

    #[test]
    fn rejects_zero_udp_write_timeout() {
        let mut conf = valid_conf();
        conf.udp_server.write_timeout = 0;
        assert!(conf.validate().is_err());
    }

    #[test]
    fn resolver_conf_rejects_zero_max_ns_queried() {
        let mut conf = valid_resolver_conf();
        conf.max_ns_queried = 0;
        assert!(conf.validate().is_err());
    }

    #[test]
    fn resolver_conf_rejects_zero_cache_clean_period() {
        let mut conf = valid_resolver_conf();
        conf.cache_conf.clean_period = 0;
        assert!(conf.validate().is_err());
    }

    #[test]
    fn resolver_conf_rejects_zero_timeouts() {
        let mut conf = valid_resolver_conf();
        conf.read_timeout = 0;
        assert!(conf.validate().is_err());
    }
}
