//! Domain types and DTOs
//!
//! Entities, request/response DTOs and the pure business rules (pricing,
//! status transitions, measurement math) that routes build on.

/// Status-like enums are stored as TEXT columns; this wires the snake_case
/// names to `as_str`, `Display` and `FromStr` so row structs can hold `String`.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    )),
                }
            }
        }
    };
}

pub mod chat;
pub mod images;
pub mod measurements;
pub mod notifications;
pub mod profiles;
pub mod projects;
pub mod quotations;
pub mod suggestions;
pub mod tax;
pub mod users;

pub use users::Role;

/// Trim an optional text field, mapping blank input to `None`.
pub fn clean_opt(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_opt_drops_blank_values() {
        assert_eq!(clean_opt(Some("  ".into())), None);
        assert_eq!(clean_opt(Some(" Pune ".into())), Some("Pune".into()));
        assert_eq!(clean_opt(None), None);
    }

    #[test]
    fn text_enums_round_trip_through_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), *role);
        }
        assert!("admin".parse::<Role>().is_err());
    }
}
