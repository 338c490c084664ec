use super::Bencode;
use crate::error::{Result, SwarmError};
use std::collections::BTreeMap;

/// Nesting limit for lists and dictionaries. Input comes from untrusted peers and trackers.
pub const MAX_DEPTH: usize = 64;

/// Decode a buffer that must contain exactly one bencoded value
pub fn decode(data: &[u8]) -> Result<Bencode> {
    let (value, end) = decode_prefix(data, 0)?;
    if end != data.len() {
        return Err(malformed(format!(
            "{} trailing bytes after value",
            data.len() - end
        )));
    }
    Ok(value)
}

/// Decode one value starting at `pos`, returning it together with the position just past it
pub fn decode_prefix(data: &[u8], pos: usize) -> Result<(Bencode, usize)> {
    let mut decoder = Decoder { data, pos, depth: 0 };
    let value = decoder.value()?;
    Ok((value, decoder.pos))
}

fn malformed(msg: impl Into<String>) -> SwarmError {
    SwarmError::MalformedEncoding(msg.into())
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    fn peek(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| malformed("unexpected end of input"))
    }

    fn value(&mut self) -> Result<Bencode> {
        match self.peek()? {
            b'i' => self.integer(),
            b'l' => self.list(),
            b'd' => self.dict(),
            b'0'..=b'9' => self.bytes().map(Bencode::Bytes),
            c => Err(malformed(format!(
                "invalid token {:?} at offset {}",
                c as char, self.pos
            ))),
        }
    }

    /// Scan forward to `terminator`, returning the bytes in between and consuming the terminator
    fn until(&mut self, terminator: u8, what: &str) -> Result<&'a [u8]> {
        let data = self.data;
        let start = self.pos;
        let rel = data[start..]
            .iter()
            .position(|&b| b == terminator)
            .ok_or_else(|| malformed(format!("unterminated {}", what)))?;
        self.pos = start + rel + 1;
        Ok(&data[start..start + rel])
    }

    fn integer(&mut self) -> Result<Bencode> {
        self.pos += 1; // 'i'
        let digits = self.until(b'e', "integer")?;

        let unsigned = digits.strip_prefix(b"-").unwrap_or(digits);
        let canonical = !unsigned.is_empty()
            && unsigned.iter().all(u8::is_ascii_digit)
            && (unsigned == b"0" || unsigned[0] != b'0')
            && digits != b"-0";
        if !canonical {
            return Err(malformed(format!(
                "invalid integer {:?}",
                String::from_utf8_lossy(digits)
            )));
        }

        // all ASCII at this point
        let text = std::str::from_utf8(digits).map_err(|_| malformed("invalid integer"))?;
        let n = text
            .parse::<i64>()
            .map_err(|_| malformed(format!("integer out of range: {}", text)))?;
        Ok(Bencode::Int(n))
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let prefix = self.until(b':', "string length")?;
        if prefix.is_empty() || !prefix.iter().all(u8::is_ascii_digit) {
            return Err(malformed("invalid string length"));
        }
        let len = std::str::from_utf8(prefix)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| malformed("invalid string length"))?;

        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| malformed(format!("string of length {} overruns buffer", len)))?;

        let out = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(out)
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(malformed(format!("nesting deeper than {}", MAX_DEPTH)));
        }
        self.pos += 1; // 'l' or 'd'
        Ok(())
    }

    /// True when the container terminator was consumed
    fn leave(&mut self, what: &str) -> Result<bool> {
        match self.data.get(self.pos) {
            None => Err(malformed(format!("unterminated {}", what))),
            Some(b'e') => {
                self.pos += 1;
                self.depth -= 1;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    fn list(&mut self) -> Result<Bencode> {
        self.enter()?;
        let mut items = Vec::new();
        while !self.leave("list")? {
            items.push(self.value()?);
        }
        Ok(Bencode::List(items))
    }

    fn dict(&mut self) -> Result<Bencode> {
        self.enter()?;
        let mut dict = BTreeMap::new();
        while !self.leave("dictionary")? {
            if !self.peek()?.is_ascii_digit() {
                return Err(malformed(format!(
                    "dictionary key at offset {} is not a byte string",
                    self.pos
                )));
            }
            let key = self.bytes()?;
            let value = self.value()?;
            if dict.insert(key.clone(), value).is_some() {
                return Err(malformed(format!(
                    "duplicate dictionary key {:?}",
                    String::from_utf8_lossy(&key)
                )));
            }
        }
        Ok(Bencode::Dict(dict))
    }
}
