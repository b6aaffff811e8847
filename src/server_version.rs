//! Server plugin version token.

use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Comparable `major.minor.patch` version of the server-side plugin.
///
/// Pre-release suffixes (`2.6.0-alpha01`) are accepted and ignored for
/// ordering purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ServerVersion {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let core = s.trim().split(['-', '+']).next().unwrap_or_default();
        let mut parts = core.split('.');

        let mut next = |required: bool| -> Result<u32, AppError> {
            match parts.next() {
                Some(p) => p
                    .parse()
                    .map_err(|_| AppError::Internal(format!("invalid server version: {}", s))),
                None if required => {
                    Err(AppError::Internal(format!("invalid server version: {}", s)))
                }
                None => Ok(0),
            }
        };

        let major = next(true)?;
        let minor = next(true)?;
        let patch = next(false)?;
        Ok(Self::new(major, minor, patch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(
            "2.6.1".parse::<ServerVersion>().unwrap(),
            ServerVersion::new(2, 6, 1)
        );
        assert_eq!(
            "2.5".parse::<ServerVersion>().unwrap(),
            ServerVersion::new(2, 5, 0)
        );
        assert_eq!(
            "2.7.0-alpha02".parse::<ServerVersion>().unwrap(),
            ServerVersion::new(2, 7, 0)
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!("".parse::<ServerVersion>().is_err());
        assert!("two.five".parse::<ServerVersion>().is_err());
        assert!("2".parse::<ServerVersion>().is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(ServerVersion::new(2, 4, 9) < ServerVersion::new(2, 5, 0));
        assert!(ServerVersion::new(3, 0, 0) > ServerVersion::new(2, 99, 99));
        assert_eq!(ServerVersion::new(2, 5, 0).to_string(), "2.5.0");
    }
}
