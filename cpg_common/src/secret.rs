use std::fmt;

const MASK: &str = "****";

/// Sensitive configuration material, such as an extended public key.
///
/// Both `Debug` and `Display` render a mask, so a `Secret` can sit inside a derived-Debug config struct without
/// leaking into logs. Reading the value requires an explicit [`Secret::reveal`] call.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    pub fn reveal(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn secrets_never_print() {
        let key = Secret::new("xpub661MyMwAqRbcF");
        assert_eq!(format!("{key}"), "****");
        assert_eq!(format!("{key:?}"), "****");
        assert_eq!(key.reveal(), "xpub661MyMwAqRbcF");
        assert!(Secret::default().is_empty());
    }
}
