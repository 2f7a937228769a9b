//! Credentials and the equality rules used when a presented credential is
//! checked against the one that validated a cached identity.
//!
//! Credentials arrive in several equivalent representations (a password may be
//! a string on one call and a character array on the next), so equality is not
//! plain structural equality. [`Credential::matches`] applies, in order:
//!
//! 1. same representation, ordered (`Text`, ordered custom types): equal iff
//!    the comparison is `Equal`;
//! 2. character arrays, then byte arrays: element-wise (constant time);
//! 3. any other array: element-wise structural equality;
//! 4. other custom types: the type's own `equals`;
//! 5. `Chars` against `Text` in either direction: compared as characters;
//! 6. everything else: not equal.
//!
//! Rule 5 is a compatibility rule for the two common password shapes only.
//! New credential types must decide their own equivalence explicitly.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;

use subtle::{Choice, ConstantTimeEq};
use zeroize::{Zeroize, Zeroizing};

use crate::types::*;

/// Extension point for credential types the crate does not know about
/// (certificates, tokens, etc).
pub trait CustomCredential: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;

    /// Whether a value of `other`'s type can stand in for this type.
    fn is_assignable_from(&self, other: &dyn CustomCredential) -> bool {
        self.as_any().type_id() == other.as_any().type_id()
    }

    /// Ordered comparison, for types that have an ordering.
    fn compare(&self, _other: &dyn CustomCredential) -> Option<Ordering> {
        None
    }

    fn equals(&self, other: &dyn CustomCredential) -> bool;

    /// An independent copy for deep subject copies. `None` shares the value.
    fn duplicate(&self) -> Option<Arc<dyn CustomCredential>> {
        None
    }
}

/// Proof presented to substantiate a principal's claim.
#[derive(Clone)]
pub enum Credential {
    Text(String),
    Chars(Vec<char>),
    Bytes(Vec<u8>),
    Array(Vec<Credential>),
    Custom(Arc<dyn CustomCredential>),
}

impl Credential {
    /// A password held as a character array.
    pub fn password(value: &str) -> Self {
        Credential::Chars(value.chars().collect())
    }

    pub fn custom<C: CustomCredential>(value: C) -> Self {
        Credential::Custom(Arc::new(value))
    }

    /// Check a presented credential against this (cached) one.
    pub fn matches(&self, presented: &Credential) -> bool {
        match (self, presented) {
            (Credential::Text(cached), Credential::Text(given)) => {
                // Lexicographic comparison yields Equal exactly when the bytes match.
                bool::from(cached.as_bytes().ct_eq(given.as_bytes()))
            }
            (Credential::Chars(cached), Credential::Chars(given)) => chars_eq(cached, given),
            (Credential::Bytes(cached), Credential::Bytes(given)) => {
                bool::from(cached.as_slice().ct_eq(given.as_slice()))
            }
            (Credential::Array(cached), Credential::Array(given)) => {
                cached.len() == given.len() && cached.iter().zip(given).all(|(a, b)| a == b)
            }
            (Credential::Custom(cached), Credential::Custom(given))
                if cached.is_assignable_from(given.as_ref()) =>
            {
                match cached.compare(given.as_ref()) {
                    Some(ordering) => ordering == Ordering::Equal,
                    None => cached.equals(given.as_ref()),
                }
            }
            (Credential::Chars(chars), Credential::Text(text))
            | (Credential::Text(text), Credential::Chars(chars)) => {
                let as_chars: Zeroizing<Vec<char>> = Zeroizing::new(text.chars().collect());
                chars_eq(chars, &as_chars)
            }
            _ => false,
        }
    }

    /// Copy for handing to another context. Deep copies also duplicate custom values.
    pub fn copy(&self, deep: bool) -> Self {
        match self {
            Credential::Custom(value) if deep => match value.duplicate() {
                Some(copy) => Credential::Custom(copy),
                None => Credential::Custom(Arc::clone(value)),
            },
            Credential::Array(items) => {
                Credential::Array(items.iter().map(|c| c.copy(deep)).collect())
            }
            other => other.clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Text(_) => "text",
            Credential::Chars(_) => "chars",
            Credential::Bytes(_) => "bytes",
            Credential::Array(_) => "array",
            Credential::Custom(_) => "custom",
        }
    }
}

/// Null-aware credential equality.
pub fn credentials_match(cached: Option<&Credential>, presented: Option<&Credential>) -> bool {
    match (cached, presented) {
        (None, None) => true,
        (Some(cached), Some(presented)) => cached.matches(presented),
        _ => false,
    }
}

fn chars_eq(a: &[char], b: &[char]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let same = a
        .iter()
        .zip(b)
        .fold(Choice::from(1u8), |acc, (x, y)| acc & (*x as u32).ct_eq(&(*y as u32)));
    same.into()
}

/// Structural equality, used for array elements.
impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Credential::Text(a), Credential::Text(b)) => a == b,
            (Credential::Chars(a), Credential::Chars(b)) => a == b,
            (Credential::Bytes(a), Credential::Bytes(b)) => a == b,
            (Credential::Array(a), Credential::Array(b)) => a == b,
            (Credential::Custom(a), Credential::Custom(b)) => {
                a.is_assignable_from(b.as_ref()) && a.equals(b.as_ref())
            }
            _ => false,
        }
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        match self {
            Credential::Text(s) => s.zeroize(),
            Credential::Chars(c) => c.zeroize(),
            Credential::Bytes(b) => b.zeroize(),
            Credential::Array(_) | Credential::Custom(_) => {}
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Credential::Custom(value) => f.debug_tuple("Custom").field(value).finish(),
            other => f.debug_tuple(other.kind()).field(&"[REDACTED]").finish(),
        }
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Credential::Text(value.to_string())
    }
}

impl From<String> for Credential {
    fn from(value: String) -> Self {
        Credential::Text(value)
    }
}

impl From<Vec<char>> for Credential {
    fn from(value: Vec<char>) -> Self {
        Credential::Chars(value)
    }
}

impl From<Vec<u8>> for Credential {
    fn from(value: Vec<u8>) -> Self {
        Credential::Bytes(value)
    }
}

impl From<&[u8]> for Credential {
    fn from(value: &[u8]) -> Self {
        Credential::Bytes(value.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Serial(u64);

    impl CustomCredential for Serial {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn compare(&self, other: &dyn CustomCredential) -> Option<Ordering> {
            other
                .as_any()
                .downcast_ref::<Serial>()
                .map(|o| self.0.cmp(&o.0))
        }

        fn equals(&self, _other: &dyn CustomCredential) -> bool {
            // Never reached: compare() takes precedence.
            false
        }
    }

    #[derive(Debug)]
    struct Token(&'static str);

    impl CustomCredential for Token {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn equals(&self, other: &dyn CustomCredential) -> bool {
            other
                .as_any()
                .downcast_ref::<Token>()
                .is_some_and(|o| o.0 == self.0)
        }
    }

    #[test]
    fn null_handling() {
        let c = Credential::from("secret");
        assert!(credentials_match(None, None));
        assert!(!credentials_match(Some(&c), None));
        assert!(!credentials_match(None, Some(&c)));
    }

    #[test]
    fn text_against_text() {
        assert!(Credential::from("secret").matches(&Credential::from("secret")));
        assert!(!Credential::from("secret").matches(&Credential::from("Secret")));
        assert!(!Credential::from("secret").matches(&Credential::from("secret2")));
    }

    #[test]
    fn chars_and_text_are_interchangeable() {
        let chars = Credential::Chars(vec!['s', 'e', 'c', 'r', 'e', 't']);
        let text = Credential::from("secret");
        assert!(chars.matches(&text));
        assert!(text.matches(&chars));
        assert!(!chars.matches(&Credential::from("secreT")));
        assert!(!chars.matches(&Credential::from("secre")));
    }

    #[test]
    fn bytes_compare_element_wise() {
        let a = Credential::from(vec![1u8, 2, 3]);
        assert!(a.matches(&Credential::from(&[1u8, 2, 3][..])));
        assert!(!a.matches(&Credential::from(vec![1u8, 2])));
        // No cross-type rule for bytes.
        assert!(!a.matches(&Credential::from("\u{1}\u{2}\u{3}")));
    }

    #[test]
    fn arrays_compare_structurally() {
        let a = Credential::Array(vec![Credential::from("x"), Credential::from(vec![7u8])]);
        let b = Credential::Array(vec![Credential::from("x"), Credential::from(vec![7u8])]);
        let c = Credential::Array(vec![Credential::from("x"), Credential::password("x")]);
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
    }

    #[test]
    fn ordered_custom_uses_comparison() {
        let a = Credential::custom(Serial(42));
        assert!(a.matches(&Credential::custom(Serial(42))));
        assert!(!a.matches(&Credential::custom(Serial(41))));
    }

    #[test]
    fn unordered_custom_uses_equals_and_type_check() {
        let a = Credential::custom(Token("t-1"));
        assert!(a.matches(&Credential::custom(Token("t-1"))));
        assert!(!a.matches(&Credential::custom(Token("t-2"))));
        assert!(!a.matches(&Credential::custom(Serial(1))));
        assert!(!a.matches(&Credential::from("t-1")));
    }

    #[test]
    fn debug_redacts_secret_material() {
        let rendered = format!("{:?}", Credential::from("hunter2"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("REDACTED"));
    }
}
