use crate::resolver::back_end::cache::*;
use crate::shared::dns;
use std::io::Write as _;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use std::{fs, io};

/// A [`Cache`] keyed by `(name, type)` holding the records cached for that
/// node/type pair, exactly as used by the [`super::Resolver`].
pub type RecordsCache = Cache<(dns::Name, dns::RecordType), Vec<dns::Record>>;

/// Persist every non-expired entry of the cache to `path`, alongside a
/// sibling `path.timestamp` file recording when the TTLs below were computed.
/// Each record is written as a line of whitespace-separated fields: owner
/// name, type, class, remaining TTL in seconds and a type-specific rdata
/// field. I/O errors are logged and swallowed, matching the source cache's
/// own tolerance for a non-writable persistence path.
pub fn persist_cache(cache: &RecordsCache, path: &str) {
    if let Err(err) = persist_cache_inner(cache, path) {
        log::warn!("Could not persist cache to '{}': {}", path, err);
    }
}

fn persist_cache_inner(cache: &RecordsCache, path: &str) -> io::Result<()> {
    let mut out = String::new();
    for (_, records, ttl) in cache.snapshot() {
        for record in records {
            out.push_str(&encode_record_line(&record, ttl));
            out.push('\n');
        }
    }
    fs::write(path, out)?;

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let mut ts_file = fs::File::create(format!("{}.timestamp", path))?;
    write!(ts_file, "{}", now)?;
    Ok(())
}

/// Load records from `path` (and its sibling `path.timestamp`) into a fresh
/// [`RecordsCache`]. Each stored TTL is reduced by the time elapsed since the
/// save, matching `stored_ttl - (now - stored_timestamp)`; entries whose
/// adjusted TTL would be `<= 0` are discarded. A missing or malformed
/// persistence file is treated as an empty cache.
pub fn load_cache(path: &str, conf: CacheConf) -> RecordsCache {
    let cache = RecordsCache::new(conf);
    if let Err(err) = load_cache_inner(&cache, path) {
        log::warn!("Could not load cache from '{}', starting empty: {}", path, err);
    }
    cache
}

fn load_cache_inner(cache: &RecordsCache, path: &str) -> io::Result<()> {
    let saved_at: u64 = fs::read_to_string(format!("{}.timestamp", path))?
        .trim()
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "malformed timestamp file"))?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let elapsed = now.saturating_sub(saved_at);

    let contents = fs::read_to_string(path)?;
    let mut by_key: std::collections::HashMap<(dns::Name, dns::RecordType), Vec<dns::Record>> =
        std::collections::HashMap::new();
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let (mut record, stored_ttl) = match decode_record_line(line) {
            Some(v) => v,
            None => continue,
        };
        let adjusted_ttl = (stored_ttl as i64) - (elapsed as i64);
        if adjusted_ttl <= 0 {
            continue;
        }
        record.set_ttl(adjusted_ttl as u32);
        by_key
            .entry((record.node().clone(), record.record_type()))
            .or_default()
            .push(record);
    }

    for ((name, rec_type), records) in by_key {
        let min_ttl = records.iter().map(|r| *r.ttl()).min().unwrap();
        cache.set((name, rec_type), Duration::new(min_ttl.into(), 0), records);
    }
    Ok(())
}

fn encode_record_line(record: &dns::Record, ttl: Duration) -> String {
    let rdata = match record {
        dns::Record::A { address, .. } => format!("{}.{}.{}.{}", address[0], address[1], address[2], address[3]),
        dns::Record::NS { name, .. } => name.to_string(),
        dns::Record::CNAME { name, .. } => name.to_string(),
        dns::Record::Opaque { .. } => return String::new(),
    };
    format!(
        "{} {} {} {} {}",
        record.node(),
        record.record_type().to_str(),
        class_to_str(record.class()),
        ttl.as_secs(),
        rdata
    )
}

fn class_to_str(class: &dns::Class) -> &'static str {
    match class {
        dns::Class::IN => "IN",
        dns::Class::CS => "CS",
        dns::Class::CH => "CH",
        dns::Class::HS => "HS",
        dns::Class::WC => "*",
    }
}

fn decode_record_line(line: &str) -> Option<(dns::Record, u64)> {
    let mut parts = line.split_whitespace();
    let node = dns::Name::from_string(parts.next()?).ok()?;
    let rec_type = dns::RecordType::from_str(parts.next()?).ok()?;
    let class = dns::Class::from_string(parts.next()?).ok()?;
    let ttl: u64 = parts.next()?.parse().ok()?;
    let rdata = parts.next()?;

    let record = match rec_type {
        dns::RecordType::A => {
            let mut octets = [0u8; 4];
            for (i, part) in rdata.split('.').enumerate().take(4) {
                octets[i] = part.parse().ok()?;
            }
            dns::Record::A { node, class, ttl: ttl as u32, data_len: 4, address: octets }
        }
        dns::RecordType::NS => dns::Record::NS {
            node,
            class,
            ttl: ttl as u32,
            data_len: 0,
            name: dns::Name::from_string(rdata).ok()?,
        },
        dns::RecordType::CNAME => dns::Record::CNAME {
            node,
            class,
            ttl: ttl as u32,
            data_len: 0,
            name: dns::Name::from_string(rdata).ok()?,
        },
        _ => return None,
    };
    Some((record, ttl))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> dns::Name {
        dns::Name::from_string(s).unwrap()
    }

    fn a_record(node: &str, addr: [u8; 4], ttl: u32) -> dns::Record {
        dns::Record::A {
            node: name(node),
            class: dns::Class::IN,
            ttl,
            data_len: 4,
            address: addr,
        }
    }

    fn tmp_path(tag: &str) -> String {
        std::env::temp_dir()
            .join(format!("shuckle-dns-persist-test-{}-{}", std::process::id(), tag))
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn encode_decode_round_trip_for_a_record() {
        let record = a_record("shuckle.ru.nl.", [1, 2, 3, 4], 300);
        let line = encode_record_line(&record, Duration::new(300, 0));
        let (decoded, ttl) = decode_record_line(&line).unwrap();
        assert_eq!(ttl, 300);
        assert_eq!(decoded.node(), record.node());
        assert_eq!(decoded.a_data(), record.a_data());
    }

    #[test]
    fn decode_rejects_malformed_lines() {
        assert!(decode_record_line("not enough fields").is_none());
        assert!(decode_record_line("shuckle.ru.nl. BOGUS IN 300 1.2.3.4").is_none());
    }

    #[test]
    fn persist_then_load_preserves_entry_and_reduces_ttl() {
        let path = tmp_path("roundtrip");
        let cache = RecordsCache::new(CacheConf::default());
        cache.set(
            (name("shuckle.ru.nl."), dns::RecordType::A),
            Duration::new(600, 0),
            vec![a_record("shuckle.ru.nl.", [9, 9, 9, 9], 600)],
        );

        persist_cache(&cache, &path);
        assert!(fs::metadata(format!("{}.timestamp", path)).is_ok());

        let loaded = load_cache(&path, CacheConf::default());
        let (_, records) = loaded.get_clone(&(name("shuckle.ru.nl."), dns::RecordType::A)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].a_data(), &[9, 9, 9, 9]);

        let _ = fs::remove_file(&path);
        let _ = fs::remove_file(format!("{}.timestamp", path));
    }

    #[test]
    fn load_from_missing_file_is_an_empty_cache() {
        let path = tmp_path("missing");
        let loaded = load_cache(&path, CacheConf::default());
        assert!(loaded.snapshot().is_empty());
    }

    #[test]
    fn load_discards_entries_whose_ttl_has_fully_elapsed() {
        let path = tmp_path("expired");
        fs::write(&path, "shuckle.ru.nl. A IN 10 1.2.3.4\n").unwrap();
        let stale_timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            .saturating_sub(3600);
        fs::write(format!("{}.timestamp", path), stale_timestamp.to_string()).unwrap();

        let loaded = load_cache(&path, CacheConf::default());
        assert!(loaded.snapshot().is_empty());

        let _ = fs::remove_file(&path);
        let _ = fs::remove_file(format!("{}.timestamp", path));
    }
}
