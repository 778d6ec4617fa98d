use crate::base::neterror::NetError;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use std::str::FromStr;

/// A header multimap that strictly preserves insertion order.
///
/// Lookups are case-insensitive because `HeaderName` is normalized to
/// lowercase. Repeated fields (e.g. `Set-Cookie`, `Warning`) are kept as
/// separate entries in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedHeaderMap {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl OrderedHeaderMap {
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Set a header, replacing every existing value of the same name.
    ///
    /// The first existing entry is updated in place so the field keeps its
    /// original position; later duplicates are dropped.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        let name = HeaderName::from_str(name).map_err(|_| NetError::InvalidHeader)?;
        let value = HeaderValue::from_str(value).map_err(|_| NetError::InvalidHeader)?;
        self.set(name, value);
        Ok(())
    }

    /// Typed variant of [`insert`](Self::insert).
    pub fn set(&mut self, name: HeaderName, value: HeaderValue) {
        let mut slot = None;
        let mut index = 0;
        self.headers.retain(|(n, _)| {
            let keep = if *n == name {
                if slot.is_none() {
                    slot = Some(index);
                    true
                } else {
                    false
                }
            } else {
                true
            };
            index += 1;
            keep
        });
        match slot {
            Some(i) => self.headers[i].1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Append a value without touching existing entries of the same name.
    pub fn append(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        let name = HeaderName::from_str(name).map_err(|_| NetError::InvalidHeader)?;
        let value = HeaderValue::from_str(value).map_err(|_| NetError::InvalidHeader)?;
        self.headers.push((name, value));
        Ok(())
    }

    /// Typed variant of [`append`](Self::append).
    pub fn push(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.push((name, value));
    }

    pub fn remove(&mut self, name: &str) {
        if let Ok(target) = HeaderName::from_str(name) {
            self.headers.retain(|(n, _)| *n != target);
        }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        let target = HeaderName::from_str(name).ok()?;
        self.headers
            .iter()
            .find(|(n, _)| *n == target)
            .map(|(_, v)| v)
    }

    /// First value of `name` as a string, if it is visible ASCII.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values of `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a HeaderValue> + 'a {
        let target = HeaderName::from_str(name).ok();
        self.headers
            .iter()
            .filter(move |(n, _)| Some(n) == target.as_ref())
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter().map(|(n, v)| (n, v))
    }

    /// Number of entries, counting repeated fields separately.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Consumes the map and returns a standard http::HeaderMap.
    pub fn to_header_map(self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in self.headers {
            map.append(name, value);
        }
        map
    }

    pub fn from_header_map(map: &HeaderMap) -> Self {
        let headers = map
            .iter()
            .map(|(n, v)| (n.clone(), v.clone()))
            .collect();
        Self { headers }
    }

    /// Parse one `name: value` line as found on the wire or in cache metadata.
    pub fn append_line(&mut self, line: &str) -> Result<(), NetError> {
        let (name, value) = line.split_once(':').ok_or(NetError::InvalidHeader)?;
        self.append(name.trim(), value.trim())
    }

    /// Serialize as `name: value\r\n` lines.
    pub fn write_lines(&self, out: &mut Vec<u8>) {
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_str().as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }
}

impl<'a> IntoIterator for &'a OrderedHeaderMap {
    type Item = &'a (HeaderName, HeaderValue);
    type IntoIter = std::slice::Iter<'a, (HeaderName, HeaderValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.headers.iter()
    }
}
