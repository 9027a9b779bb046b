//! Permission token grammar.
//!
//! `bundle:group:level` or `bundle:group:level:ownership`, colon-delimited,
//! no escaping.

/// A parsed permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionToken<'a> {
    pub bundle: &'a str,
    pub group: &'a str,
    pub level: &'a str,
    /// Optional fourth segment. Carried through but not used for bit lookup.
    pub ownership: Option<&'a str>,
}

impl<'a> PermissionToken<'a> {
    /// Parse a token. Returns `None` unless it has exactly 3 or 4 parts.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        match *parts.as_slice() {
            [bundle, group, level] => Some(Self {
                bundle,
                group,
                level,
                ownership: None,
            }),
            [bundle, group, level, ownership] => Some(Self {
                bundle,
                group,
                level,
                ownership: Some(ownership),
            }),
            _ => None,
        }
    }

    /// Whether this is the plain three-part form.
    pub const fn is_simple(&self) -> bool {
        self.ownership.is_none()
    }
}

/// Split a compiler request key `bundle:group`. Returns `None` unless it has
/// exactly two parts.
pub fn split_group_key(key: &str) -> Option<(&str, &str)> {
    let (bundle, group) = key.split_once(':')?;
    if group.contains(':') {
        return None;
    }
    Some((bundle, group))
}
