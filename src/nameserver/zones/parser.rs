use crate::nameserver::zones::catalog::Catalog;
use crate::nameserver::zones::errors::*;
use crate::nameserver::zones::tokens::*;
use crate::nameserver::zones::utils::*;
use crate::shared::dns;
use std::collections::HashMap;
use std::net;
use std::str::FromStr;

/// Configuration needed to parse a single zone master file into a [`Zone`].
#[derive(Debug)]
pub struct ZoneFileConf {
    pub file_path: String,
    pub zone: dns::Name,
    pub starting_ttl: u32,
}

/// Parse every zone file described by `confs` and collect the results into a
/// [`Catalog`]. Each file is parsed and validated independently: delegation
/// between zones (NS records pointing at another zone's apex) is resolved
/// later, at lookup time, by the catalog itself.
pub fn parse_zone_files(confs: Vec<ZoneFileConf>) -> Result<Catalog, ParseErrCtx> {
    let mut catalog = Catalog::new();
    for conf in confs {
        let zone = parse_zone_file(&conf)?;
        if let Err(err) = validate_zone(&zone) {
            return Err((err, format!("validating zone: {}", zone.zone)));
        }
        catalog.insert(zone);
    }
    Ok(catalog)
}

/// Validate entries found in a zone file. NS records must be present and
/// owned by the top node of the zone (SOA presence/placement is checked
/// while parsing).
fn validate_zone(zone: &Zone) -> Result<(), ParseErr> {
    let ns_records = zone.get_all_of_type(dns::RecordType::NS);
    if ns_records.is_empty() {
        let err_msg = format!("no NS records in zone file '{}'", zone.zone);
        return Err(ParseErr::MalformedZone(err_msg));
    }
    for ns_record in ns_records {
        if !ns_record.node().is_in_zone_root(&zone.zone) {
            let err_msg = format!("NS record must be in top node '{}'", zone.zone);
            return Err(ParseErr::NameNotInRootNode(err_msg));
        }
    }
    Ok(())
}

/// The set of records owned by every node of a single zone, indexed by
/// owner name and then by record type.
pub struct Zone {
    records: HashMap<dns::Name, HashMap<dns::RecordType, Vec<dns::Record>>>,
    pub zone: dns::Name,
}

impl Zone {
    /// Create a new, empty [`Zone`] rooted at `zone`.
    pub fn new(zone: &dns::Name) -> Self {
        Self {
            records: Default::default(),
            zone: zone.clone(),
        }
    }

    /// Insert a new [`dns::Record`] into the zone records collection.
    pub fn insert(&mut self, record: dns::Record) {
        let outer_entry = self.records.entry(record.node().clone());
        let inner_map = outer_entry.or_default();
        let inner_entry = inner_map.entry(record.record_type());
        let records = inner_entry.or_default();
        records.push(record);
    }

    /// Get the records owned by `node` of the given type.
    pub fn get(&self, node: &dns::Name, kind: dns::RecordType) -> Option<&Vec<dns::Record>> {
        let inner_map = self.records.get(node)?;
        let records = inner_map.get(&kind)?;
        debug_assert!(records.iter().all(|r| r.record_type() == kind));
        debug_assert!(records.iter().all(|r| r.node() == node));
        assert!(!records.is_empty());
        Some(records)
    }

    /// Get every record owned by `node`, regardless of type.
    pub fn get_owner(&self, node: &dns::Name) -> Vec<&dns::Record> {
        match self.records.get(node) {
            None => vec![],
            Some(by_type) => by_type.values().flatten().collect(),
        }
    }

    /// Get all records of the given type, regardless of owner.
    pub fn get_all_of_type(&self, kind: dns::RecordType) -> Vec<&dns::Record> {
        self.records.iter().filter_map(|(_, r)| r.get(&kind)).flatten().collect()
    }
}

/// Representation of the different types of entries expected in a zone file.
#[derive(Debug)]
enum ZoneEntry {
    Origin(dns::Name),
    Ttl(u32),
    Soa { node: dns::Name, minimum: u32, ttl: u32 },
    Record(dns::Record),
}

#[derive(Debug)]
struct ParsingState<'a> {
    pub zone: &'a dns::Name,
    pub current_file: &'a str,
    pub current_orig: dns::Name,
    pub current_ttl: u32,
    pub min_ttl: u32,
}

/// Parse a single zone master file into a [`Zone`]. A `SOA` record, owned by
/// the zone's top node, must appear somewhere in the file; it is used only to
/// derive the zone's minimum TTL and is never inserted into the returned [`Zone`].
fn parse_zone_file(conf: &ZoneFileConf) -> Result<Zone, ParseErrCtx> {
    log::info!("Parsing zone file {:?}", conf.file_path);
    let mut tokenizer = match Tokenizer::from_file(&conf.file_path) {
        Err(err) => return Err((ParseErr::ReadingErr(err), conf.file_path.to_string())),
        Ok(v) => v,
    };

    let mut state = ParsingState {
        zone: &conf.zone,
        current_file: &conf.file_path,
        current_orig: conf.zone.clone(),
        current_ttl: conf.starting_ttl,
        min_ttl: 0,
    };

    let mut zone = Zone::new(&conf.zone);
    let mut soa_seen = false;

    loop {
        // Peek only. All tokens are needed to parse the file entry.
        let line = tokenizer.line();
        let next_token = tokenizer.peek();
        let next_token = match next_token {
            Err(err) => return Err((err.into(), format!("{}, line: {}", state.current_file, line))),
            Ok(Token::End) => break,
            Ok(v) => v,
        };

        let line = tokenizer.line();
        let entry = match &next_token {
            Token::OriginDir => parse_origin(&mut tokenizer, &state),
            Token::TtlDir => parse_ttl_directive(&mut tokenizer),
            Token::String(_) => parse_record(&mut tokenizer, &state),
            Token::At => parse_record(&mut tokenizer, &state),
            Token::Blank => parse_record(&mut tokenizer, &state),
            _ => Err(ParseErr::UnexpectedToken(next_token)),
        };
        let entry = match entry {
            Err(err) => return Err((err, format!("{}, line: {}", state.current_file, line))),
            Ok(entry) => entry,
        };

        log::debug!("Line {}: {:?}", line, entry);
        match entry {
            ZoneEntry::Origin(origin) => state.current_orig = origin,
            ZoneEntry::Ttl(ttl) => state.current_ttl = ttl,
            ZoneEntry::Soa { node, minimum, ttl } => {
                if &node != state.zone {
                    let err_msg = format!("{}, line: {}", state.current_file, line);
                    return Err((ParseErr::NameNotInRootNode(node.to_string()), err_msg));
                }
                if let Err(err) = ensure_min_ttl(minimum, ttl) {
                    return Err((err, format!("{}, line: {}", state.current_file, line)));
                }
                state.min_ttl = minimum;
                soa_seen = true;
            }
            ZoneEntry::Record(record) => {
                state.current_ttl = *record.ttl();
                zone.insert(record);
            }
        };
    }

    if !soa_seen {
        let err_msg = format!("no SOA record in zone file '{}'", conf.zone);
        return Err((ParseErr::MalformedZone(err_msg), conf.file_path.clone()));
    }

    Ok(zone)
}

/// Parse and validate an `$ORIGIN` directive, returning the related [`ZoneEntry::Origin`].
fn parse_origin(tokenizer: &mut Tokenizer, state: &ParsingState) -> Result<ZoneEntry, ParseErr> {
    assert!(matches!(tokenizer.next(), Ok(Token::OriginDir)));

    let origin = tokenizer.next_after_blanks()?;
    let origin = if let Token::String(origin) = origin {
        ensure_absolute_name(&origin)?;
        let origin = dns::Name::from_string(&origin)?;
        ensure_name_in_zone(&origin, state.zone)?;
        origin
    } else {
        return Err(ParseErr::UnexpectedToken(origin));
    };

    let newline = tokenizer.next_after_blanks()?;
    match newline {
        Token::NewLine => Ok(ZoneEntry::Origin(origin)),
        Token::End => Ok(ZoneEntry::Origin(origin)),
        _ => Err(ParseErr::UnexpectedToken(newline)),
    }
}

/// Parse and validate a `$TTL` directive, returning the related [`ZoneEntry::Ttl`].
fn parse_ttl_directive(tokenizer: &mut Tokenizer) -> Result<ZoneEntry, ParseErr> {
    assert!(matches!(tokenizer.next(), Ok(Token::TtlDir)));

    let literal = tokenizer.next_after_blanks()?;
    let literal = match literal {
        Token::String(s) => s,
        Token::Number(n) => n.to_string(),
        _ => return Err(ParseErr::UnexpectedToken(literal)),
    };
    let ttl = parse_duration(&literal)?;

    let newline = tokenizer.next_after_blanks()?;
    match newline {
        Token::NewLine => Ok(ZoneEntry::Ttl(ttl)),
        Token::End => Ok(ZoneEntry::Ttl(ttl)),
        _ => Err(ParseErr::UnexpectedToken(newline)),
    }
}

/// Parse and validate a 'record' entry, returning the related [ZoneEntry]. Records
/// starting with blank or '@' are assigned to the last stated origin.
fn parse_record(tokenizer: &mut Tokenizer, state: &ParsingState) -> Result<ZoneEntry, ParseErr> {
    let node = match tokenizer.next() {
        Ok(Token::Blank) => state.current_orig.clone(),
        Ok(Token::At) => state.current_orig.clone(),
        Ok(Token::String(mut name)) => {
            let name = adjust_name(&state.current_orig, &mut name)?;
            ensure_name_in_zone(&name, state.zone)?;
            name
        }
        _ => unreachable!(),
    };

    // Parse and validate TTL, class and record type.
    let (ttl, class) = parse_ttl_class(tokenizer)?;
    let class = class.unwrap_or(dns::Class::IN);
    let ttl = ttl.unwrap_or(state.current_ttl);
    ensure_class_is_supported(&class)?;
    ensure_min_ttl(state.min_ttl, ttl)?;

    let record_type = tokenizer.next_after_blanks()?;
    let record_type = match record_type {
        Token::String(s) => s,
        _ => return Err(ParseErr::UnexpectedToken(record_type)),
    };
    let record_type = match dns::RecordType::from_str(&record_type) {
        Err(_) => {
            let err_msg = format!("unknown type: {}", record_type);
            return Err(ParseErr::MalformedData(err_msg));
        }
        Ok(v) => v,
    };

    // Parse the record data and compose the complete entry.
    let record_data = (node, class, ttl);
    let entry = match record_type {
        dns::RecordType::A => ZoneEntry::Record(parse_a_record(tokenizer, record_data)?),
        dns::RecordType::NS => ZoneEntry::Record(parse_ns_record(tokenizer, &state.current_orig, record_data)?),
        dns::RecordType::CNAME => ZoneEntry::Record(parse_cname_record(tokenizer, &state.current_orig, record_data)?),
        dns::RecordType::SOA => parse_soa_fields(tokenizer, &state.current_orig, record_data)?,
        v => {
            let err_msg = format!("type not supported: {:?}", v);
            return Err(ParseErr::UnexpectedRecord(err_msg));
        }
    };

    let next = tokenizer.next_after_blanks()?;
    match next {
        Token::NewLine => Ok(entry),
        Token::End => Ok(entry),
        _ => Err(ParseErr::UnexpectedToken(next)),
    }
}

type RecData = (dns::Name, dns::Class, u32);

fn parse_a_record(tokens: &mut Tokenizer, rec_data: RecData) -> Result<dns::Record, ParseErr> {
    let ip = tokens.next_after_blanks()?;
    let address = if let Token::String(s) = &ip {
        match net::Ipv4Addr::from_str(s) {
            Err(err) => return Err(ParseErr::MalformedData(err.to_string())),
            Ok(ip) => ip.octets(),
        }
    } else {
        return Err(ParseErr::UnexpectedToken(ip));
    };

    Ok(dns::Record::A {
        node: rec_data.0,
        class: rec_data.1,
        ttl: rec_data.2,
        data_len: 0,
        address,
    })
}

fn parse_ns_record(tokens: &mut Tokenizer, origin: &dns::Name, rec_data: RecData) -> Result<dns::Record, ParseErr> {
    let name = tokens.next_after_blanks()?;
    let name = if let Token::String(mut s) = name {
        adjust_name(origin, &mut s)?
    } else {
        return Err(ParseErr::UnexpectedToken(name));
    };

    Ok(dns::Record::NS {
        node: rec_data.0,
        class: rec_data.1,
        ttl: rec_data.2,
        data_len: 0,
        name,
    })
}

fn parse_cname_record(tokens: &mut Tokenizer, origin: &dns::Name, rec_data: RecData) -> Result<dns::Record, ParseErr> {
    let name = tokens.next_after_blanks()?;
    let name = match name {
        Token::At => origin.clone(),
        Token::String(mut s) => adjust_name(origin, &mut s)?,
        _ => return Err(ParseErr::UnexpectedToken(name)),
    };

    Ok(dns::Record::CNAME {
        node: rec_data.0,
        class: rec_data.1,
        ttl: rec_data.2,
        data_len: 0,
        name,
    })
}

/// Parse the fields of a SOA record. Only `node` and `minimum` (the last
/// numeric field) are kept: SOA is zone master-file bookkeeping only and is
/// never stored in a [`Zone`] nor answered over the wire.
fn parse_soa_fields(tokens: &mut Tokenizer, origin: &dns::Name, rec_data: RecData) -> Result<ZoneEntry, ParseErr> {
    let (node, _class, ttl) = rec_data;

    let token = tokens.next_after_blanks()?;
    match token {
        Token::String(mut name) => {
            adjust_name(origin, &mut name)?;
        }
        _ => return Err(ParseErr::UnexpectedToken(token)),
    };

    let token = tokens.next_after_blanks()?;
    match token {
        Token::String(mut name) => {
            adjust_name(origin, &mut name)?;
        }
        _ => return Err(ParseErr::UnexpectedToken(token)),
    };

    let mut params = [0_u32; 5];
    for slot in params.iter_mut() {
        let next = tokens.next_after_blanks()?;
        match next {
            Token::Number(n) => *slot = n,
            _ => return Err(ParseErr::UnexpectedToken(next)),
        }
    }

    Ok(ZoneEntry::Soa { node, minimum: params[4], ttl })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> dns::Name {
        dns::Name::from_string(s).unwrap()
    }

    fn tmp_zone_file(tag: &str, contents: &str) -> String {
        let path = std::env::temp_dir()
            .join(format!("shuckle-dns-parser-test-{}-{}.zone", std::process::id(), tag))
            .to_string_lossy()
            .into_owned();
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn parses_a_well_formed_zone_file() {
        let path = tmp_zone_file(
            "well-formed",
            "$TTL 3600\n\
             $ORIGIN ru.nl.\n\
             ; this is a comment\n\
             @ IN SOA ns1.ru.nl. hostmaster.ru.nl. 1 7200 3600 1209600 3600\n\
             @ IN NS ns1.ru.nl.\n\
             shuckle IN A 1.2.3.4\n\
             alias IN CNAME shuckle.ru.nl.\n",
        );

        let catalog = parse_zone_files(vec![ZoneFileConf {
            file_path: path.clone(),
            zone: name("ru.nl."),
            starting_ttl: 300,
        }])
        .unwrap();

        let (answers, _, found) = catalog.lookup(&name("shuckle.ru.nl."), dns::RecordType::A);
        assert!(found);
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].a_data(), &[1, 2, 3, 4]);

        let (answers, _, found) = catalog.lookup(&name("alias.ru.nl."), dns::RecordType::A);
        assert!(found);
        assert_eq!(answers.len(), 2);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rejects_zone_file_missing_soa() {
        let path = tmp_zone_file(
            "no-soa",
            "$ORIGIN ru.nl.\n\
             @ IN NS ns1.ru.nl.\n\
             shuckle IN A 1.2.3.4\n",
        );

        let result = parse_zone_files(vec![ZoneFileConf {
            file_path: path.clone(),
            zone: name("ru.nl."),
            starting_ttl: 300,
        }]);
        assert!(result.is_err());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rejects_zone_file_missing_ns_at_apex() {
        let path = tmp_zone_file(
            "no-ns",
            "$ORIGIN ru.nl.\n\
             @ IN SOA ns1.ru.nl. hostmaster.ru.nl. 1 7200 3600 1209600 3600\n\
             shuckle IN A 1.2.3.4\n",
        );

        let result = parse_zone_files(vec![ZoneFileConf {
            file_path: path.clone(),
            zone: name("ru.nl."),
            starting_ttl: 300,
        }]);
        assert!(result.is_err());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rejects_malformed_record_line() {
        let path = tmp_zone_file(
            "malformed",
            "$ORIGIN ru.nl.\n\
             @ IN SOA ns1.ru.nl. hostmaster.ru.nl. 1 7200 3600 1209600 3600\n\
             @ IN NS ns1.ru.nl.\n\
             shuckle IN BOGUS 1.2.3.4\n",
        );

        let result = parse_zone_files(vec![ZoneFileConf {
            file_path: path.clone(),
            zone: name("ru.nl."),
            starting_ttl: 300,
        }]);
        assert!(result.is_err());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn soa_record_is_never_inserted_into_the_zone() {
        let path = tmp_zone_file(
            "soa-bookkeeping-only",
            "$ORIGIN ru.nl.\n\
             @ IN SOA ns1.ru.nl. hostmaster.ru.nl. 1 7200 3600 1209600 3600\n\
             @ IN NS ns1.ru.nl.\n",
        );

        let catalog = parse_zone_files(vec![ZoneFileConf {
            file_path: path.clone(),
            zone: name("ru.nl."),
            starting_ttl: 300,
        }])
        .unwrap();

        let (_, _, found) = catalog.lookup(&name("ru.nl."), dns::RecordType::SOA);
        assert!(!found);

        let _ = std::fs::remove_file(&path);
    }
}
