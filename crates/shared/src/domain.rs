use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ParseEnumError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(PatientId);
id_newtype!(AppointmentId);
id_newtype!(PrescriptionId);
id_newtype!(InvoiceId);
id_newtype!(NotificationId);

/// Generates the wire-name table, `as_str` and `FromStr` for a unit enum.
macro_rules! wire_enum {
    ($name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                let wanted = raw.trim().to_ascii_uppercase().replace('-', "_");
                $(
                    if wanted == $wire {
                        return Ok($name::$variant);
                    }
                )+
                Err(ParseEnumError::new(stringify!($name), raw))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Doctor,
    Secretary,
}

wire_enum!(Role {
    Admin => "ADMIN",
    Doctor => "DOCTOR",
    Secretary => "SECRETARY",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    CheckedIn,
    Completed,
    Cancelled,
    NoShow,
}

wire_enum!(AppointmentStatus {
    Scheduled => "SCHEDULED",
    Confirmed => "CONFIRMED",
    CheckedIn => "CHECKED_IN",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    NoShow => "NO_SHOW",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

wire_enum!(InvoiceStatus {
    Draft => "DRAFT",
    Sent => "SENT",
    Paid => "PAID",
    Overdue => "OVERDUE",
    Cancelled => "CANCELLED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

wire_enum!(Gender {
    Male => "MALE",
    Female => "FEMALE",
    Other => "OTHER",
    Unknown => "UNKNOWN",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    AppointmentReminder,
    NewMessage,
    PrescriptionReady,
    InvoiceGenerated,
    AppointmentCancelled,
    AppointmentModified,
    #[default]
    SystemNotification,
}

wire_enum!(NotificationType {
    AppointmentReminder => "APPOINTMENT_REMINDER",
    NewMessage => "NEW_MESSAGE",
    PrescriptionReady => "PRESCRIPTION_READY",
    InvoiceGenerated => "INVOICE_GENERATED",
    AppointmentCancelled => "APPOINTMENT_CANCELLED",
    AppointmentModified => "APPOINTMENT_MODIFIED",
    SystemNotification => "SYSTEM_NOTIFICATION",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatMessageKind {
    #[default]
    Chat,
    Join,
    Leave,
}
