//! Cookie generation.

use rand::Rng;

/// Random 16-bit groups per cookie.
pub const COOKIE_GROUPS: usize = 8;

/// Length of every issued cookie.
pub const COOKIE_LEN: usize = COOKIE_GROUPS * 4;

/// Generate a candidate cookie: eight random 16-bit values as zero-padded
/// lowercase hex. Uniqueness is checked by the caller against the user store.
pub fn generate_cookie<R: Rng>(rng: &mut R) -> String {
    let mut cookie = String::with_capacity(COOKIE_LEN);
    for _ in 0..COOKIE_GROUPS {
        let group: u16 = rng.gen();
        cookie.push_str(&format!("{group:04x}"));
    }
    cookie
}
