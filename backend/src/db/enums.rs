use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::{Decode, Encode, Postgres, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Closed enums stored as upper-case TEXT columns and sent as the same strings on the wire.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn names() -> Vec<&'static str> {
                Self::ALL.iter().map(|v| v.as_str()).collect()
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.trim().to_uppercase().parse().map_err(de::Error::custom)
            }
        }

        impl Type<Postgres> for $name {
            fn type_info() -> PgTypeInfo {
                <str as Type<Postgres>>::type_info()
            }

            fn compatible(ty: &PgTypeInfo) -> bool {
                <str as Type<Postgres>>::compatible(ty)
            }
        }

        impl<'q> Encode<'q, Postgres> for $name {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> IsNull {
                <&str as Encode<'q, Postgres>>::encode(self.as_str(), buf)
            }
        }

        impl<'r> Decode<'r, Postgres> for $name {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                let raw = <&str as Decode<'r, Postgres>>::decode(value)?;
                Ok(raw.parse()?)
            }
        }
    };
}

text_enum! {
    /// Exactly one per identity. Only super admins may change it after creation.
    Role {
        SuperAdmin => "SUPER_ADMIN",
        Agent => "AGENT",
        Farmer => "FARMER",
    }
}

text_enum! {
    Breed {
        Holstein => "HOLSTEIN",
        Jersey => "JERSEY",
        Guernsey => "GUERNSEY",
        Ayrshire => "AYRSHIRE",
        BrownSwiss => "BROWN_SWISS",
        Other => "OTHER",
    }
}

text_enum! {
    CowStatus {
        Active => "ACTIVE",
        Inactive => "INACTIVE",
        Sold => "SOLD",
        Deceased => "DECEASED",
    }
}

text_enum! {
    Quality {
        Excellent => "EXCELLENT",
        Good => "GOOD",
        Average => "AVERAGE",
        Poor => "POOR",
    }
}

text_enum! {
    ActivityType {
        Milking => "MILKING",
        Feeding => "FEEDING",
        HealthCheck => "HEALTH_CHECK",
        Vaccination => "VACCINATION",
        Breeding => "BREEDING",
        Calving => "CALVING",
        Weighing => "WEIGHING",
        Medication => "MEDICATION",
        Cleaning => "CLEANING",
        Maintenance => "MAINTENANCE",
        Other => "OTHER",
    }
}

text_enum! {
    ActivityStatus {
        Planned => "PLANNED",
        InProgress => "IN_PROGRESS",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
    }
}

text_enum! {
    CalfGender {
        Male => "MALE",
        Female => "FEMALE",
    }
}

impl ActivityType {
    /// Routine daily work that may only be back-dated by a week.
    pub fn is_routine(&self) -> bool {
        matches!(
            self,
            ActivityType::Milking | ActivityType::Feeding | ActivityType::Cleaning
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActivityType::Milking => "Milking",
            ActivityType::Feeding => "Feeding",
            ActivityType::HealthCheck => "Health Check",
            ActivityType::Vaccination => "Vaccination",
            ActivityType::Breeding => "Breeding",
            ActivityType::Calving => "Calving",
            ActivityType::Weighing => "Weighing",
            ActivityType::Medication => "Medication",
            ActivityType::Cleaning => "Cleaning",
            ActivityType::Maintenance => "Maintenance",
            ActivityType::Other => "Other",
        }
    }
}
