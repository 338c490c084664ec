use std::collections::BTreeMap;

/// A decoded bencode node. Containers own their children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bencode {
    /// i<digits>e
    Int(i64),
    /// <length>:<bytes>
    Bytes(Vec<u8>),
    /// l<items>e
    List(Vec<Bencode>),
    /// d<key-value pairs>e, keys kept in canonical (sorted) order
    Dict(BTreeMap<Vec<u8>, Bencode>),
}

impl Bencode {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Bencode::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Bencode::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Byte string interpreted as UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Bencode>> {
        match self {
            Bencode::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Look up a key when this node is a dictionary
    pub fn get(&self, key: &[u8]) -> Option<&Bencode> {
        self.as_dict()?.get(key)
    }

    pub fn get_str(&self, key: &[u8]) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_int(&self, key: &[u8]) -> Option<i64> {
        self.get(key)?.as_int()
    }

    pub fn get_bytes(&self, key: &[u8]) -> Option<&[u8]> {
        self.get(key)?.as_bytes()
    }
}

impl From<i64> for Bencode {
    fn from(value: i64) -> Self {
        Bencode::Int(value)
    }
}

impl From<&[u8]> for Bencode {
    fn from(value: &[u8]) -> Self {
        Bencode::Bytes(value.to_vec())
    }
}

impl From<&str> for Bencode {
    fn from(value: &str) -> Self {
        Bencode::Bytes(value.as_bytes().to_vec())
    }
}
