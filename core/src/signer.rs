//! Request signing.
//!
//! The signature is the hex MD5 of the shared secret followed by every text
//! field's name and value, fields taken in sorted name order. File fields and
//! null fields never take part.

use crate::fields::Fields;

/// Computes `api_sig` for `fields`.
pub fn sign(secret: &str, fields: &Fields) -> String {
    sign_pairs(secret, fields.text_pairs())
}

/// Signs already-stringified pairs. Order of `pairs` does not matter.
pub fn sign_pairs<'a>(secret: &str, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut pairs: Vec<(&str, &str)> = pairs.into_iter().collect();
    pairs.sort_unstable();

    let mut plain = String::from(secret);
    for (name, value) in pairs {
        plain.push_str(name);
        plain.push_str(value);
    }
    format!("{:x}", md5::compute(plain.as_bytes()))
}
