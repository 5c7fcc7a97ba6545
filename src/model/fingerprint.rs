//! [`Fingerprint`] — the cache key identifying a `(policy, version, prompt)`
//! triple (spec §3).

use ring::digest::{digest, SHA256};

/// `SHA-256(policy_id ‖ 0x00 ‖ policy_version ‖ 0x00 ‖ text)`, lowercase hex.
///
/// Fingerprints change whenever `policy_version` changes, so a policy edit
/// can never serve a stale cached verdict (spec §3 invariant).
pub type Fingerprint = String;

/// Compute the [`Fingerprint`] for a `(policy_id, policy_version, text)` triple.
#[must_use]
pub fn fingerprint(policy_id: &str, policy_version: u64, text: &str) -> Fingerprint {
    let mut buf = Vec::with_capacity(policy_id.len() + text.len() + 24);
    buf.extend_from_slice(policy_id.as_bytes());
    buf.push(0);
    buf.extend_from_slice(policy_version.to_string().as_bytes());
    buf.push(0);
    buf.extend_from_slice(text.as_bytes());

    let hash = digest(&SHA256, &buf);
    hex_encode(hash.as_ref())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        write!(s, "{b:02x}").expect("writing to a String never fails");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_hex() {
        let fp = fingerprint("default", 1, "hello");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_changes_with_policy_version() {
        let a = fingerprint("default", 1, "hello");
        let b = fingerprint("default", 2, "hello");
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_changes_with_policy_id() {
        let a = fingerprint("default", 1, "hello");
        let b = fingerprint("strict", 1, "hello");
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_changes_with_text() {
        let a = fingerprint("default", 1, "hello");
        let b = fingerprint("default", 1, "hello!");
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_stable_for_equal_inputs() {
        let a = fingerprint("default", 1, "hello");
        let b = fingerprint("default", 1, "hello");
        assert_eq!(a, b);
    }

    #[test]
    fn separator_prevents_boundary_shift_collisions() {
        // Without the 0x00 separators, "a" ‖ "11" ‖ "" and "a1" ‖ "1" ‖ "" would
        // both concatenate to the same raw bytes ("a11").
        let a = fingerprint("a", 11, "");
        let b = fingerprint("a1", 1, "");
        assert_ne!(a, b);
    }
}
