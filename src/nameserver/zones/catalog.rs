use crate::nameserver::zones::parser::Zone;
use crate::shared::dns;
use std::collections::{HashMap, HashSet};

/// A collection of independently-parsed [`Zone`]s, indexed by their apex
/// name. Immutable after construction: safe to share across handler threads
/// behind an `Arc` without synchronization.
pub struct Catalog {
    zones: HashMap<dns::Name, Zone>,
}

impl Catalog {
    /// Create an empty [`Catalog`].
    pub fn new() -> Self {
        Catalog { zones: HashMap::new() }
    }

    /// Add a [`Zone`] to the catalog, indexed by its apex.
    pub fn insert(&mut self, zone: Zone) {
        self.zones.insert(zone.zone.clone(), zone);
    }

    /// Given a query `(qname, qtype)`, produce an `(answers, authorities, found)`
    /// triple, following CNAME and NS delegation chains within the catalog.
    /// `qtype == CNAME` disables CNAME auto-following for the outermost query,
    /// matching RFC 1035 semantics for a direct CNAME lookup.
    pub fn lookup(&self, qname: &dns::Name, qtype: dns::RecordType) -> (Vec<dns::Record>, Vec<dns::Record>, bool) {
        let mut visited = HashSet::new();
        self.lookup_inner(qname, qtype, &mut visited)
    }

    fn lookup_inner(
        &self,
        qname: &dns::Name,
        qtype: dns::RecordType,
        visited: &mut HashSet<dns::Name>,
    ) -> (Vec<dns::Record>, Vec<dns::Record>, bool) {
        if !visited.insert(qname.clone()) {
            return (vec![], vec![], false);
        }

        let zone = match self.find_zone(qname) {
            None => return (vec![], vec![], false),
            Some(z) => z,
        };

        let mut answers = vec![];
        let mut authorities = vec![];

        for record in zone.get_owner(qname) {
            if record.record_type() == qtype {
                answers.push(record.clone());
            } else if let dns::Record::CNAME { name, .. } = record {
                if qtype != dns::RecordType::CNAME {
                    answers.push(record.clone());
                    let (extra_ans, extra_auth, _) = self.lookup_inner(name, qtype, visited);
                    answers.extend(extra_ans);
                    authorities.extend(extra_auth);
                }
            }
        }

        for suffix in suffixes_down_to_apex(qname, &zone.zone) {
            let ns_records = match zone.get(&suffix, dns::RecordType::NS) {
                None => continue,
                Some(v) => v,
            };
            for ns in ns_records {
                authorities.push(ns.clone());
                if let dns::Record::NS { name, .. } = ns {
                    let (extra_ans, extra_auth, _) = self.lookup_inner(name, qtype, visited);
                    answers.extend(extra_ans);
                    authorities.extend(extra_auth);
                }
            }
        }

        dedup_records(&mut answers);
        dedup_records(&mut authorities);
        let found = !answers.is_empty() || !authorities.is_empty();
        (answers, authorities, found)
    }

    // Choose the zone whose apex is the longest (label-wise) suffix of `qname`.
    fn find_zone(&self, qname: &dns::Name) -> Option<&Zone> {
        self.zones
            .values()
            .filter(|z| qname.is_in_zone(&z.zone))
            .max_by_key(|z| z.zone.label_count())
    }
}

// Every suffix of `qname`, from the full name down to (and including) `apex`.
fn suffixes_down_to_apex(qname: &dns::Name, apex: &dns::Name) -> Vec<dns::Name> {
    let q_labels: Vec<&str> = split_labels(qname);
    let apex_len = apex.label_count();

    let mut out = Vec::new();
    let mut start = 0;
    while q_labels.len() >= apex_len && q_labels.len() - start >= apex_len {
        let joined = if q_labels[start..].is_empty() {
            ".".to_string()
        } else {
            format!("{}.", q_labels[start..].join("."))
        };
        if let Ok(name) = dns::Name::from_string(&joined) {
            out.push(name);
        }
        start += 1;
    }
    out
}

fn split_labels(name: &dns::Name) -> Vec<&str> {
    let s = name.as_ref();
    if s == "." {
        Vec::new()
    } else {
        s.trim_end_matches('.').split('.').collect()
    }
}

// Records don't implement `PartialEq` (wire-level variants carry encoded
// lengths that are irrelevant to identity), so dedup on the fields the
// specification treats as identity: owner, type and textual rdata.
fn dedup_records(records: &mut Vec<dns::Record>) {
    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(record_identity(r)));
}

fn record_identity(record: &dns::Record) -> (dns::Name, dns::RecordType, String) {
    let rdata = match record {
        dns::Record::A { address, .. } => format!("{}.{}.{}.{}", address[0], address[1], address[2], address[3]),
        dns::Record::NS { name, .. } => name.to_string(),
        dns::Record::CNAME { name, .. } => name.to_string(),
        dns::Record::Opaque { bytes, .. } => format!("{:?}", bytes),
    };
    (record.node().clone(), record.record_type(), rdata)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> dns::Name {
        dns::Name::from_string(s).unwrap()
    }

    fn ns(node: &str, target: &str) -> dns::Record {
        dns::Record::NS {
            node: name(node),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            name: name(target),
        }
    }

    fn a(node: &str, addr: [u8; 4]) -> dns::Record {
        dns::Record::A {
            node: name(node),
            class: dns::Class::IN,
            ttl: 300,
            data_len: 4,
            address: addr,
        }
    }

    fn cname(node: &str, target: &str) -> dns::Record {
        dns::Record::CNAME {
            node: name(node),
            class: dns::Class::IN,
            ttl: 300,
            data_len: 0,
            name: name(target),
        }
    }

    #[test]
    fn exact_match_in_apex_zone() {
        let mut zone = Zone::new(&name("ru.nl."));
        zone.insert(ns("ru.nl.", "ns1.ru.nl."));
        zone.insert(a("shuckle.ru.nl.", [1, 2, 3, 4]));
        let mut catalog = Catalog::new();
        catalog.insert(zone);

        let (answers, _authorities, found) = catalog.lookup(&name("shuckle.ru.nl."), dns::RecordType::A);
        assert!(found);
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].a_data(), &[1, 2, 3, 4]);
    }

    #[test]
    fn cname_is_followed_and_resolved() {
        let mut zone = Zone::new(&name("ru.nl."));
        zone.insert(ns("ru.nl.", "ns1.ru.nl."));
        zone.insert(cname("alias.ru.nl.", "shuckle.ru.nl."));
        zone.insert(a("shuckle.ru.nl.", [9, 9, 9, 9]));
        let mut catalog = Catalog::new();
        catalog.insert(zone);

        let (answers, _authorities, found) = catalog.lookup(&name("alias.ru.nl."), dns::RecordType::A);
        assert!(found);
        assert_eq!(answers.len(), 2);
        assert!(answers.iter().any(|r| matches!(r, dns::Record::CNAME { .. })));
        assert!(answers.iter().any(|r| matches!(r, dns::Record::A { .. })));
    }

    #[test]
    fn cname_query_does_not_auto_follow() {
        let mut zone = Zone::new(&name("ru.nl."));
        zone.insert(ns("ru.nl.", "ns1.ru.nl."));
        zone.insert(cname("alias.ru.nl.", "shuckle.ru.nl."));
        zone.insert(a("shuckle.ru.nl.", [9, 9, 9, 9]));
        let mut catalog = Catalog::new();
        catalog.insert(zone);

        let (answers, _authorities, found) = catalog.lookup(&name("alias.ru.nl."), dns::RecordType::CNAME);
        assert!(found);
        assert_eq!(answers.len(), 1);
        assert!(matches!(answers[0], dns::Record::CNAME { .. }));
    }

    #[test]
    fn delegation_collects_ns_authority_with_glue() {
        let mut parent = Zone::new(&name("ru.nl."));
        parent.insert(ns("ru.nl.", "ns1.ru.nl."));
        parent.insert(ns("cs.ru.nl.", "ns1.cs.ru.nl."));
        parent.insert(a("ns1.cs.ru.nl.", [10, 0, 0, 1]));

        let mut child = Zone::new(&name("cs.ru.nl."));
        child.insert(ns("cs.ru.nl.", "ns1.cs.ru.nl."));
        child.insert(a("shuckle.cs.ru.nl.", [8, 8, 8, 8]));

        let mut catalog = Catalog::new();
        catalog.insert(parent);
        catalog.insert(child);

        let (answers, authorities, found) = catalog.lookup(&name("shuckle.cs.ru.nl."), dns::RecordType::A);
        assert!(found);
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].a_data(), &[8, 8, 8, 8]);
        assert!(authorities.iter().any(|r| matches!(r, dns::Record::NS { .. })));
    }

    #[test]
    fn unknown_name_is_not_found() {
        let mut zone = Zone::new(&name("ru.nl."));
        zone.insert(ns("ru.nl.", "ns1.ru.nl."));
        let mut catalog = Catalog::new();
        catalog.insert(zone);

        let (answers, authorities, found) = catalog.lookup(&name("nope.example.com."), dns::RecordType::A);
        assert!(!found);
        assert!(answers.is_empty());
        assert!(authorities.is_empty());
    }
}
