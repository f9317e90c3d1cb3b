//! Typed identifiers for uploads and operations.
//!
//! Each id is a newtype over `Uuid`, so an [`OperationId`] cannot be passed
//! where an [`UploadId`] is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! typed_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                /// Create a new random id.
                #[must_use]
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }

                #[must_use]
                pub fn as_uuid(&self) -> &Uuid {
                    &self.0
                }

                /// First eight hex digits, for compact log lines.
                #[must_use]
                pub fn short(&self) -> String {
                    let mut s = self.0.simple().to_string();
                    s.truncate(8);
                    s
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $name {
                type Err = uuid::Error;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    Uuid::parse_str(s).map(Self)
                }
            }

            impl From<Uuid> for $name {
                fn from(uuid: Uuid) -> Self {
                    Self(uuid)
                }
            }
        )+
    };
}

typed_id! {
    /// Identifies one run of the upload pipeline for one asset.
    UploadId,
    /// Identifies a single operation instance; carried in every log line the
    /// operation emits.
    OperationId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(OperationId::new(), OperationId::new());
    }

    #[test]
    fn display_and_from_str() {
        let id = UploadId::new();
        let parsed: UploadId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn short_form_is_prefix() {
        let id = OperationId::new();
        let short = id.short();
        assert_eq!(short.len(), 8);
        assert!(id.as_uuid().simple().to_string().starts_with(&short));
    }

    #[test]
    fn invalid_from_str() {
        assert!(UploadId::from_str("not-a-uuid").is_err());
    }
}
