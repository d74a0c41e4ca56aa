//! Initial passwords for provisioned users

use rand::rngs::OsRng;
use rand::seq::SliceRandom;

pub const PASSWORD_SYMBOLS: &[u8] = b"!@#$%^&*()-_=+";
pub const DEFAULT_PASSWORD_LENGTH: usize = 20;

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";

/// Generate a password of at least `length` characters containing at least
/// one uppercase letter, lowercase letter, digit and symbol.
pub fn generate_password(length: usize) -> String {
    let mut rng = OsRng;
    let alphabet: Vec<u8> = [UPPER, LOWER, DIGITS, PASSWORD_SYMBOLS].concat();

    let mut chars: Vec<u8> = [UPPER, LOWER, DIGITS, PASSWORD_SYMBOLS]
        .iter()
        .filter_map(|class| class.choose(&mut rng).copied())
        .collect();

    let remaining = length.max(chars.len()) - chars.len();
    chars.extend((0..remaining).filter_map(|_| alphabet.choose(&mut rng).copied()));
    chars.shuffle(&mut rng);

    chars.into_iter().map(char::from).collect()
}
