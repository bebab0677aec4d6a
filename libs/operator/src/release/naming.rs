//! Release naming: `releaseName = cr.name + "-" + shortUID(cr.uid)`.
//!
//! The UID is embedded so recreating a CR with the same name never collides
//! with a prior release's history. The encoding must be deterministic,
//! case-insensitive and stable across operator restarts.

use uuid::Uuid;

/// Encode a UUID's 16 bytes as lowercase base36; on parse failure, fall back
/// to the UID with dashes stripped so naming never fails outright.
pub fn short_uid(uid: &str) -> String {
    match Uuid::parse_str(uid) {
        Ok(parsed) => to_base36(parsed.as_bytes()),
        Err(_) => uid.replace('-', "").to_lowercase(),
    }
}

/// Compute the stable release name for a CR instance.
pub fn release_name(cr_name: &str, cr_uid: &str) -> String {
    format!("{cr_name}-{}", short_uid(cr_uid))
}

/// Treat the 16 bytes as a big-endian unsigned integer and base36-encode it,
/// lowercased, with no leading-zero padding beyond what's needed to be
/// non-empty.
fn to_base36(bytes: &[u8; 16]) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    // 128-bit value as big-endian digits, divided down repeatedly.
    let mut digits = bytes.to_vec();
    let mut out = Vec::new();

    // strip to the working bytes only once all-zero input is handled below
    loop {
        let mut remainder: u32 = 0;
        let mut all_zero = true;
        for byte in digits.iter_mut() {
            let acc = (remainder << 8) | (*byte as u32);
            *byte = (acc / 36) as u8;
            remainder = acc % 36;
            if *byte != 0 {
                all_zero = false;
            }
        }
        out.push(ALPHABET[remainder as usize]);
        if all_zero {
            break;
        }
    }
    out.reverse();
    String::from_utf8(out).expect("base36 alphabet is ASCII")
}
