use crate::shared::buffer::*;
use crate::shared::dns::class::*;
use crate::shared::dns::errors::*;
use crate::shared::dns::name::*;
use crate::shared::dns::types::*;
use crate::shared::dns::utils::*;

/// Records present in the answer, authority and additional sections of dns
/// messages. A dns record refers to a specific node of the name system,
/// describing a specific type of resource. Only `A`, `NS` and `CNAME` get a
/// typed payload; every other [RecordType] that is tolerated on the wire
/// (e.g. `SOA`, seen only inside zone master files) decodes into `Opaque`,
/// carrying its raw rdata bytes along unparsed.
#[derive(Debug, Clone)]
pub enum Record {
    A {
        node: Name,
        class: Class,
        ttl: u32,
        data_len: u16,
        address: [u8; 4],
    },
    NS {
        node: Name,
        class: Class,
        ttl: u32,
        data_len: u16,
        name: Name,
    },
    CNAME {
        node: Name,
        class: Class,
        ttl: u32,
        data_len: u16,
        name: Name,
    },
    Opaque {
        node: Name,
        rec_type: RecordType,
        class: Class,
        ttl: u32,
        data_len: u16,
        bytes: Vec<u8>,
    },
}

impl Record {
    /// Decode a dns message [`Record`] from the bytes read from the passed
    /// buffer. Unsupported types/classes are detected and the function returns
    /// proper errors. Unknown record types still cause the bytes of that record
    /// to be consumed (and an error is returned as usual). Types that are
    /// supported on the wire but carry no typed variant here (e.g. `SOA`)
    /// decode into [`Record::Opaque`].
    pub fn decode_from_buf(buffer: &mut BitsBuf) -> Result<Record, ParsingErr> {
        let node = Name::from_bytes(buffer)?;
        let rec_type = decode_record_type(buffer)?;
        let class = decode_class(check_end(buffer.read_u16())?)?;
        let ttl = check_end(buffer.read_u32())?;
        let data_len = check_end(buffer.read_u16())?;

        match rec_type {
            RecordType::A => {
                let address = decode_a_data(buffer, data_len)?;
                Ok(Record::A { node, class, ttl, data_len, address })
            }
            RecordType::NS => {
                let name = decode_ns_data(buffer, data_len)?;
                Ok(Record::NS { node, class, ttl, data_len, name })
            }
            RecordType::CNAME => {
                let name = decode_cname_data(buffer, data_len)?;
                Ok(Record::CNAME { node, class, ttl, data_len, name })
            }
            _ => {
                let bytes = check_end(buffer.read_bytes_vec(data_len as usize))?;
                Ok(Record::Opaque { node, rec_type, class, ttl, data_len, bytes })
            }
        }
    }

    /// Decode a dns message [`Record`] from the bytes slice passed in.
    /// Wrapper function that allows decoding the record from raw bytes,
    /// opposed to [Record::decode_from_buf] method which needs a buffer.
    pub fn decode_from_bytes(bytes: &[u8]) -> Result<Record, ParsingErr> {
        let mut buf = BitsBuf::from_raw_bytes(bytes);
        Record::decode_from_buf(&mut buf)
    }

    /// Encode a dns message [`Record`] to raw bytes, writing them into the
    /// provided buffer. This function panics if some unsupported class or
    /// types are provided (to maintain invariants about supported features).
    pub fn encode_to_buf(&self, buffer: &mut BitsBuf) -> Result<(), ParsingErr> {
        let node = self.node();
        let class = self.class();
        let ttl = *self.ttl();
        let rec_type = self.record_type();

        assert!(rec_type.is_supported_for_records());
        assert!(matches!(class, Class::IN));

        buffer.write_bytes(&node.to_bytes());
        buffer.write_u16(rec_type.to_num());
        buffer.write_u16(class.to_num());
        buffer.write_u32(ttl);

        match self {
            Record::A { address, .. } => encode_a_data(buffer, address),
            Record::NS { name, .. } => encode_ns_data(buffer, name)?,
            Record::CNAME { name, .. } => encode_cname_data(buffer, name)?,
            Record::Opaque { bytes, .. } => {
                buffer.write_u16(bytes.len() as u16);
                buffer.write_bytes(bytes);
            }
        }

        Ok(())
    }
}

fn decode_record_type(buffer: &mut BitsBuf) -> Result<RecordType, ParsingErr> {
    match RecordType::from_num(check_end(buffer.read_u16())?) {
        Ok(v) if !v.is_supported_for_records() => Err(ParsingErr::UnsupportedType(v)),
        Ok(v) => Ok(v),
        Err(n) => {
            check_end(buffer.read_u16())?;
            check_end(buffer.read_u32())?;
            let data_len = check_end(buffer.read_u16())?;
            check_end(buffer.read_bytes_vec(data_len as usize))?;
            Err(ParsingErr::UnknownType(n))
        }
    }
}

fn decode_class(n: u16) -> Result<Class, ParsingErr> {
    match Class::from_num(n) {
        Ok(v) if !v.is_supported() => Err(ParsingErr::UnsupportedClass(v)),
        Err(n) => Err(ParsingErr::UnknownClass(n)),
        Ok(v) => Ok(v),
    }
}

// The following implementation block is dedicated to getter and setter function.
// Note that some of them are generated via macros, but not all of them. It would
// be nice in the future to reduce the code by using more macros.

macro_rules! getter {
    ($i: ident, $fn_name: ident, $type: ty) => {
        /// Returns the $i contained in the [`Record`].
        pub fn $fn_name(&self) -> $type {
            match self {
                Record::A { $i, .. } => $i,
                Record::NS { $i, .. } => $i,
                Record::CNAME { $i, .. } => $i,
                Record::Opaque { $i, .. } => $i,
            }
        }
    };
}

macro_rules! setter {
    ($i: ident, $fn_name: ident, $type: ty) => {
        /// Sets the the $i contained in the [`Record`].
        pub fn $fn_name(&mut self, v: $type) {
            match self {
                Record::A { $i, .. } => *$i = v,
                Record::NS { $i, .. } => *$i = v,
                Record::CNAME { $i, .. } => *$i = v,
                Record::Opaque { $i, .. } => *$i = v,
            }
        }
    };
}

impl Record {
    getter!(node, node, &Name);
    getter!(class, class, &Class);
    getter!(ttl, ttl, &u32);
    getter!(data_len, data_len, &u16);
    setter!(ttl, set_ttl, u32);

    /// Returns the [RecordType] variant corresponding with the [`Record`].
    pub fn record_type(&self) -> RecordType {
        match self {
            Record::A { .. } => RecordType::A,
            Record::NS { .. } => RecordType::NS,
            Record::CNAME { .. } => RecordType::CNAME,
            Record::Opaque { rec_type, .. } => *rec_type,
        }
    }

    /// Returns a reference to the A record data.
    /// Panics if the [`Record`] is not of type A.
    pub fn a_data(&self) -> &[u8; 4] {
        match self {
            Record::A { address, .. } => address,
            _ => panic!("a_data"),
        }
    }

    /// Returns a reference to the NS record data.
    /// Panics if the [`Record`] is not of type NS.
    pub fn ns_data(&self) -> &Name {
        match self {
            Record::NS { name, .. } => name,
            _ => panic!("ns_data"),
        }
    }

    /// Returns a reference to the CNAME record data.
    /// Panics if the [`Record`] is not of type CNAME.
    pub fn cname_data(&self) -> &Name {
        match self {
            Record::CNAME { name, .. } => name,
            _ => panic!("cname_data"),
        }
    }
}

// The following functions are all related to decoding/encoding the variable
// data part of the typed record types. Decoding functions MUST all check for
// correct data length, while encoding ones MUST write the correct value of
// data len before the data.

// A records data encoding and decoding functions.
fn decode_a_data(buffer: &mut BitsBuf, data_len: u16) -> Result<[u8; 4], ParsingErr> {
    if data_len != 4 {
        Err(ParsingErr::DataLenMismatch)
    } else {
        Ok(buffer.read_bytes().ok_or(ParsingErr::BytesEnd)?)
    }
}

fn encode_a_data(buffer: &mut BitsBuf, ip: &[u8; 4]) {
    buffer.write_u16(4);
    buffer.write_bytes(ip);
}

// NS records data encoding and decoding functions.
fn decode_ns_data(buffer: &mut BitsBuf, data_len: u16) -> Result<Name, ParsingErr> {
    let before = buffer.read_pos();
    let nameserver = Name::from_bytes(buffer)?;
    let after = buffer.read_pos();
    if after - before != (data_len * 8) as usize {
        Err(ParsingErr::DataLenMismatch)
    } else {
        Ok(nameserver)
    }
}

fn encode_ns_data(buffer: &mut BitsBuf, name: &Name) -> Result<(), ParsingErr> {
    let domain_name = name.to_bytes();
    buffer.write_u16(domain_name.len() as u16);
    buffer.write_bytes(&domain_name);
    Ok(())
}

// CNAME records data encoding and decoding functions.
fn decode_cname_data(buffer: &mut BitsBuf, data_len: u16) -> Result<Name, ParsingErr> {
    let before = buffer.read_pos();
    let alias = Name::from_bytes(buffer)?;
    let after = buffer.read_pos();
    if after - before != (data_len * 8) as usize {
        Err(ParsingErr::DataLenMismatch)
    } else {
        Ok(alias)
    }
}

fn encode_cname_data(buffer: &mut BitsBuf, name: &Name) -> Result<(), ParsingErr> {
    let domain_name = name.to_bytes();
    buffer.write_u16(domain_name.len() as u16);
    buffer.write_bytes(&domain_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        Name::from_string(s).unwrap()
    }

    #[test]
    fn encode_decode_a_record() {
        let rec = Record::A {
            node: name("example.com."),
            class: Class::IN,
            ttl: 300,
            data_len: 4,
            address: [93, 184, 216, 34],
        };
        let mut buf = BitsBuf::new();
        rec.encode_to_buf(&mut buf).unwrap();
        let decoded = Record::decode_from_bytes(&buf.into_vec()).unwrap();
        assert_eq!(decoded.a_data(), &[93, 184, 216, 34]);
        assert_eq!(*decoded.ttl(), 300);
        assert_eq!(decoded.record_type(), RecordType::A);
    }

    #[test]
    fn encode_decode_ns_record() {
        let rec = Record::NS {
            node: name("example.com."),
            class: Class::IN,
            ttl: 3600,
            data_len: 0,
            name: name("ns1.example.com."),
        };
        let mut buf = BitsBuf::new();
        rec.encode_to_buf(&mut buf).unwrap();
        let decoded = Record::decode_from_bytes(&buf.into_vec()).unwrap();
        assert_eq!(decoded.ns_data().to_string(), "ns1.example.com.");
    }

    #[test]
    fn encode_decode_cname_record() {
        let rec = Record::CNAME {
            node: name("www.example.com."),
            class: Class::IN,
            ttl: 60,
            data_len: 0,
            name: name("example.com."),
        };
        let mut buf = BitsBuf::new();
        rec.encode_to_buf(&mut buf).unwrap();
        let decoded = Record::decode_from_bytes(&buf.into_vec()).unwrap();
        assert_eq!(decoded.cname_data().to_string(), "example.com.");
    }

    #[test]
    fn a_record_wrong_data_len_is_rejected() {
        let mut buf = BitsBuf::new();
        buf.write_bytes(&name("example.com.").to_bytes());
        buf.write_u16(RecordType::A.to_num());
        buf.write_u16(Class::IN.to_num());
        buf.write_u32(300);
        buf.write_u16(3); // wrong data_len for an A record
        buf.write_bytes(&[1, 2, 3]);
        let err = Record::decode_from_bytes(&buf.into_vec()).unwrap_err();
        assert!(matches!(err, ParsingErr::DataLenMismatch));
    }

    #[test]
    fn unknown_type_is_consumed_and_reported() {
        let mut buf = BitsBuf::new();
        buf.write_bytes(&name("example.com.").to_bytes());
        buf.write_u16(65000); // not a known record type
        buf.write_u16(Class::IN.to_num());
        buf.write_u32(60);
        buf.write_u16(2);
        buf.write_bytes(&[0xAB, 0xCD]);
        let err = Record::decode_from_bytes(&buf.into_vec()).unwrap_err();
        assert!(matches!(err, ParsingErr::UnknownType(65000)));
    }
}
