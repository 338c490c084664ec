mod decoder;
mod encoder;
mod value;

pub use decoder::{decode, decode_prefix, MAX_DEPTH};
pub use encoder::encode;
pub use value::Bencode;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SwarmError;
    use std::collections::BTreeMap;

    fn assert_malformed(input: &[u8]) {
        match decode(input) {
            Err(SwarmError::MalformedEncoding(_)) => {}
            other => panic!("expected MalformedEncoding for {:?}, got {:?}", input, other),
        }
    }

    #[test]
    fn test_integer_encoding() {
        assert_eq!(encode(&Bencode::Int(42)), b"i42e");
        assert_eq!(encode(&Bencode::Int(-7)), b"i-7e");
    }

    #[test]
    fn test_string_encoding() {
        assert_eq!(encode(&Bencode::from("spam")), b"4:spam");
        assert_eq!(encode(&Bencode::Bytes(Vec::new())), b"0:");
    }

    #[test]
    fn test_dict_keys_emitted_sorted() {
        let mut dict = BTreeMap::new();
        dict.insert(b"foo".to_vec(), Bencode::Int(42));
        dict.insert(b"bar".to_vec(), Bencode::from("spam"));
        assert_eq!(encode(&Bencode::Dict(dict)), b"d3:bar4:spam3:fooi42ee");
    }

    #[test]
    fn test_roundtrip_nested() {
        let mut inner = BTreeMap::new();
        inner.insert(b"piece length".to_vec(), Bencode::Int(16384));
        inner.insert(b"pieces".to_vec(), Bencode::Bytes(vec![0, 255, 7]));
        inner.insert(b"empty".to_vec(), Bencode::Bytes(Vec::new()));

        let original = Bencode::List(vec![
            Bencode::Int(0),
            Bencode::Int(-123),
            Bencode::List(vec![Bencode::List(Vec::new()), Bencode::from("x")]),
            Bencode::Dict(inner),
        ]);

        let decoded = decode(&encode(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_prefix_reports_position() {
        let data = b"4:spami3etrailing";
        let (first, pos) = decode_prefix(data, 0).unwrap();
        assert_eq!(first, Bencode::from("spam"));
        assert_eq!(pos, 6);

        let (second, pos) = decode_prefix(data, pos).unwrap();
        assert_eq!(second, Bencode::Int(3));
        assert_eq!(pos, 9);
    }

    #[test]
    fn test_unsorted_keys_are_canonicalised() {
        let decoded = decode(b"d1:bi2e1:ai1ee").unwrap();
        assert_eq!(encode(&decoded), b"d1:ai1e1:bi2ee");
    }

    #[test]
    fn test_malformed_inputs() {
        assert_malformed(b"i42");
        assert_malformed(b"ie");
        assert_malformed(b"i-0e");
        assert_malformed(b"i03e");
        assert_malformed(b"i4x2e");
        assert_malformed(b"5:spam");
        assert_malformed(b"-1:a");
        assert_malformed(b"3x:abc");
        assert_malformed(b"l4:spam");
        assert_malformed(b"d3:fooi1e");
        assert_malformed(b"di1ei2ee");
        assert_malformed(b"d1:ai1e1:ai2ee");
        assert_malformed(b"i1ei2e");
        assert_malformed(b"x");
        assert_malformed(b"");
    }

    #[test]
    fn test_depth_guard() {
        let ok_depth = MAX_DEPTH;
        let mut nested = vec![b'l'; ok_depth];
        nested.extend(std::iter::repeat(b'e').take(ok_depth));
        assert!(decode(&nested).is_ok());

        let too_deep = MAX_DEPTH + 1;
        let mut nested = vec![b'l'; too_deep];
        nested.extend(std::iter::repeat(b'e').take(too_deep));
        assert_malformed(&nested);
    }

    #[test]
    fn test_huge_length_prefix_rejected() {
        assert_malformed(b"18446744073709551615:a");
        assert_malformed(b"99999999999999999999999:a");
    }

    #[test]
    fn test_dict_accessors() {
        let value = decode(b"d8:announce3:url6:lengthi10ee").unwrap();
        assert_eq!(value.get_str(b"announce"), Some("url"));
        assert_eq!(value.get_int(b"length"), Some(10));
        assert_eq!(value.get_bytes(b"missing"), None);
    }
}
