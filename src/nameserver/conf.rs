use crate::resolver::conf::ResolverConf;
use crate::shared::dns;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::{fs, net};

/// Configuration values obtained parsing the configuration file.
#[derive(Debug, Serialize, Deserialize)]
pub struct Conf {
    pub log_level: log::Level,
    pub udp_server: UdpServerConf,
    pub zones: Vec<ZoneConf>,
    /// Params for the embedded resolver used to answer queries for names
    /// outside every zone below, when the client has recursion desired set.
    pub resolver: ResolverConf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UdpServerConf {
    pub address: String,
    pub port: u16,
    pub write_timeout: u64,
    pub threads: usize,
}

/// One independently-parsed master file, loaded into its own [`Zone`](crate::nameserver::Zone)
/// and added to the server's [`Catalog`](crate::nameserver::Catalog).
#[derive(Debug, Serialize, Deserialize)]
pub struct ZoneConf {
    pub zone: String,
    pub file: String,
    pub starting_ttl: u32,
}

impl Conf {
    /// Read and parse the configuration values from a file. The file must
    /// be JSON-encoded and follow the organization of the [Conf] struct.
    pub fn from_file(path: &str) -> Result<Self, String> {
        let file_bytes = match fs::read_to_string(path) {
            Err(err) => return Err(err.to_string()),
            Ok(v) => v,
        };
        let conf = match serde_json::from_str::<Self>(&file_bytes) {
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

        // Zone confs.
        if self.zones.is_empty() {
            return Err("no zones configured".to_string());
        }
        for zone_conf in &self.zones {
            if let Err(err) = dns::Name::from_string(&zone_conf.zone) {
                return Err(format!("zone top node {} invalid: {:?}", zone_conf.zone, err));
            }
        }

        self.resolver.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::conf::{CacheConf, TraceConf};

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
            zones: vec![ZoneConf {
                zone: "ru.nl.".to_string(),
                file: "ru.nl.zone".to_string(),
                starting_ttl: 3600,
            }],
            resolver: valid_resolver_conf(),
        }
    }

    #[test]
    fn valid_conf_passes_validation() {
        assert!(valid_conf().validate().is_ok());
    }

    #[test]
    fn rejects_no_zones() {
        let mut conf = valid_conf();
        conf.zones.clear();
        assert!(conf.validate().is_err());
    }

    #[test]
    fn rejects_invalid_zone_name() {
        let mut conf = valid_conf();
        conf.zones[0].zone = "not a name".to_string();
        assert!(conf.validate().is_err());
    }

    #[test]
    fn rejects_invalid_udp_address() {
        let mut conf = valid_conf();
        conf.udp_server.address = "not-an-ip".to_string();
        assert!(conf.validate().is_err());
    }

    #[test]
    fn rejects_zero_udp_threads() {
        let mut conf = valid_conf();
        conf.udp_server.threads = 0;
        assert!(conf.validate().is_err());
    }

    #[test]
    fn delegates_to_embedded_resolver_validation() {
        let mut conf = valid_conf();
        conf.resolver.max_cname_redir = 0;
        assert!(conf.validate().is_err());
    }
}
