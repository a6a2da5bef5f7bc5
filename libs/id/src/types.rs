//! The ID types used across the commit path.

use crate::IdError;

/// Defines a prefixed, ULID-backed ID newtype.
///
/// Generated types parse strictly from `{prefix}_{ulid}`, display in the same
/// form, and serialize as plain strings.
macro_rules! resource_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(ulid::Ulid);

        impl $name {
            /// The string prefix identifying this resource type.
            pub const PREFIX: &'static str = $prefix;

            /// Generates a fresh ID.
            #[must_use]
            pub fn new() -> Self {
                Self(ulid::Ulid::new())
            }

            /// Parses an ID from its `{prefix}_{ulid}` string form.
            pub fn parse(s: &str) -> Result<Self, IdError> {
                if s.is_empty() {
                    return Err(IdError::Empty);
                }
                let Some((prefix, rest)) = s.split_once('_') else {
                    return Err(IdError::MissingSeparator);
                };
                if prefix != Self::PREFIX {
                    return Err(IdError::WrongPrefix {
                        expected: Self::PREFIX,
                        actual: prefix.to_string(),
                    });
                }
                let ulid = rest
                    .parse::<ulid::Ulid>()
                    .map_err(|e| IdError::InvalidUlid(e.to_string()))?;
                Ok(Self(ulid))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

resource_id!(
    /// Identifies a container. Stable for the container's whole lifetime and
    /// never reused while the container exists.
    ContainerId,
    "ctr"
);

resource_id!(
    /// Identifies a backing virtual machine on the virtualization host.
    /// Assigned by the remote management API at creation time.
    VmId,
    "vm"
);

resource_id!(
    /// Identifies an asynchronous task issued against the management API.
    TaskId,
    "task"
);
