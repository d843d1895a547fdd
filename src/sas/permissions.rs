use crate::error::{FileShareError, Result};
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Permission bits granted by a shared access signature.
    ///
    /// Each bit is evaluated on its own by the service; `LIST` only grants
    /// anything when the token is scoped to a share.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SharedAccessPermissions: u8 {
        const READ = 0b0_0001;
        const CREATE = 0b0_0010;
        const WRITE = 0b0_0100;
        const DELETE = 0b0_1000;
        const LIST = 0b1_0000;
    }
}

/// Serialization order of the `sp` field.
const ORDER: [(SharedAccessPermissions, char); 5] = [
    (SharedAccessPermissions::READ, 'r'),
    (SharedAccessPermissions::CREATE, 'c'),
    (SharedAccessPermissions::WRITE, 'w'),
    (SharedAccessPermissions::DELETE, 'd'),
    (SharedAccessPermissions::LIST, 'l'),
];

impl SharedAccessPermissions {
    /// Permission string in the canonical `rcwdl` order.
    pub fn to_permission_string(self) -> String {
        ORDER
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, c)| *c)
            .collect()
    }

    /// Parse a permission string. Letters may appear in any order.
    pub fn parse(input: &str) -> Result<Self> {
        input.chars().try_fold(Self::empty(), |acc, c| {
            ORDER
                .iter()
                .find(|(_, letter)| *letter == c)
                .map(|(flag, _)| acc | *flag)
                .ok_or_else(|| {
                    FileShareError::invalid_argument(format!("Unknown permission '{c}' in '{input}'"))
                })
        })
    }
}

impl fmt::Display for SharedAccessPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_permission_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_string_order() {
        let all = SharedAccessPermissions::all();
        assert_eq!(all.to_permission_string(), "rcwdl");

        let p = SharedAccessPermissions::LIST | SharedAccessPermissions::READ;
        assert_eq!(p.to_string(), "rl");
    }

    #[test]
    fn test_parse_any_order() {
        let p = SharedAccessPermissions::parse("ldwcr").unwrap();
        assert_eq!(p, SharedAccessPermissions::all());
        assert!(SharedAccessPermissions::parse("").unwrap().is_empty());
        assert!(SharedAccessPermissions::parse("rx").is_err());
    }
}
